use crate::dom::{Dom, ElementData, NodeData, NodeId, Styles, is_block_tag, is_void_tag};

impl Dom {
    pub fn inner_html(&self) -> String {
        self.inner_html_of(self.root())
    }

    pub fn inner_html_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_node(child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Replaces the editing root's content with parsed `html`.
    pub fn set_inner_html(&mut self, html: &str) {
        self.clear();
        let root = self.root();
        parse_into(self, root, html);
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(text)) => escape_text(text, out),
            Some(NodeData::Element(el)) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
                if !el.styles.is_empty() {
                    out.push_str(" style=\"");
                    escape_attr(&styles_to_string(&el.styles), out);
                    out.push('"');
                }
                out.push('>');
                if is_void_tag(&el.tag) {
                    return;
                }
                for &child in self.children(id) {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
            None => {}
        }
    }
}

pub fn styles_to_string(styles: &Styles) -> String {
    styles
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn parse_styles(source: &str) -> Styles {
    source
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            (!name.is_empty() && !value.is_empty()).then(|| (name, value.to_string()))
        })
        .collect()
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn decode_entities(source: &str) -> String {
    if !source.contains('&') {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..].find(';').and_then(|semi| {
            let name = &rest[1..1 + semi];
            decode_entity(name).map(|ch| (ch, semi + 2))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn is_done(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn skip_past(&mut self, token: &str) {
        match self.rest().find(token) {
            Some(ix) => self.pos += ix + token.len(),
            None => self.pos = self.src.len(),
        }
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == ':'
}

fn starts_tag(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|ch| ch.is_ascii_alphabetic())
}

fn starts_end_tag(rest: &str) -> bool {
    rest.starts_with("</") && rest[2..].chars().next().is_some_and(|ch| ch.is_ascii_alphabetic())
}

/// Lenient parser for the markup this crate serializes (and tolerable hand-written HTML).
fn parse_into(dom: &mut Dom, parent: NodeId, html: &str) {
    let mut cursor = Cursor { src: html, pos: 0 };
    let mut stack: Vec<NodeId> = vec![parent];

    while !cursor.is_done() {
        let rest = cursor.rest();
        if rest.starts_with("<!--") {
            cursor.skip_past("-->");
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            cursor.skip_past(">");
            continue;
        }
        if starts_end_tag(rest) {
            cursor.eat("</");
            let name = cursor.take_while(is_name_char).to_ascii_lowercase();
            cursor.skip_past(">");
            close_element(dom, &mut stack, &name);
            continue;
        }
        if starts_tag(rest) {
            cursor.eat("<");
            let (element, self_closing) = parse_start_tag(&mut cursor);
            auto_close(dom, &mut stack, &element.tag);
            let tag = element.tag.clone();
            let node = dom.create_element(element);
            let current = stack.last().copied().unwrap_or(parent);
            dom.append_child(current, node);
            if !self_closing && !is_void_tag(&tag) {
                stack.push(node);
            }
            continue;
        }

        let start = cursor.pos;
        cursor.bump();
        while !cursor.is_done() {
            let rest = cursor.rest();
            if starts_tag(rest) || starts_end_tag(rest) || rest.starts_with("<!") {
                break;
            }
            cursor.bump();
        }
        let text = decode_entities(&html[start..cursor.pos]);
        let current = stack.last().copied().unwrap_or(parent);
        append_text(dom, current, text);
    }
}

fn parse_start_tag(cursor: &mut Cursor<'_>) -> (ElementData, bool) {
    let name = cursor.take_while(is_name_char);
    let mut element = ElementData::new(name);
    loop {
        cursor.skip_whitespace();
        if cursor.is_done() {
            return (element, false);
        }
        if cursor.eat("/>") {
            return (element, true);
        }
        if cursor.eat(">") {
            return (element, false);
        }
        let attr = cursor
            .take_while(|ch| !ch.is_whitespace() && !matches!(ch, '=' | '>' | '/'))
            .to_ascii_lowercase();
        if attr.is_empty() {
            cursor.bump();
            continue;
        }
        cursor.skip_whitespace();
        let value = if cursor.eat("=") {
            cursor.skip_whitespace();
            match cursor.peek() {
                Some(quote @ ('"' | '\'')) => {
                    cursor.bump();
                    let value = cursor.take_while(|ch| ch != quote);
                    cursor.bump();
                    decode_entities(value)
                }
                _ => decode_entities(cursor.take_while(|ch| !ch.is_whitespace() && ch != '>')),
            }
        } else {
            String::new()
        };
        if attr == "style" {
            element.styles = parse_styles(&value);
        } else {
            element.attrs.insert(attr, value);
        }
    }
}

fn append_text(dom: &mut Dom, parent: NodeId, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = dom.last_child(parent) {
        if let Some(existing) = dom.text(last) {
            let merged = format!("{existing}{text}");
            dom.set_text(last, merged);
            return;
        }
    }
    let node = dom.create_text(text);
    dom.append_child(parent, node);
}

fn close_element(dom: &Dom, stack: &mut Vec<NodeId>, name: &str) {
    let Some(depth) = stack
        .iter()
        .skip(1)
        .rposition(|&node| dom.is_tag(node, name))
    else {
        return;
    };
    stack.truncate(depth + 1);
}

fn auto_close(dom: &Dom, stack: &mut Vec<NodeId>, tag: &str) {
    let Some(&top) = stack.last() else {
        return;
    };
    if stack.len() < 2 {
        return;
    }
    let closes = match dom.tag(top) {
        Some("p") => is_block_tag(tag),
        Some("li") => tag == "li",
        Some("td" | "th") => matches!(tag, "td" | "th" | "tr"),
        Some("tr") => tag == "tr",
        _ => false,
    };
    if closes {
        stack.pop();
        if matches!(tag, "tr") && stack.len() > 1 && dom.is_tag(stack[stack.len() - 1], "tr") {
            stack.pop();
        }
    }
}
