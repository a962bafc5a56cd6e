use crate::caret::{Caret, Selection};
use crate::dom::{Dom, NodeId};

pub type DetectorCallback = Box<dyn FnMut(&Dom, &[NodeId])>;

/// Selection-change listeners, typically toolbar state.
#[derive(Default)]
pub struct Detector {
    callbacks: Vec<DetectorCallback>,
}

impl Detector {
    pub fn register(&mut self, callback: impl FnMut(&Dom, &[NodeId]) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn notify(&mut self, dom: &Dom, selection: &Selection) {
        if self.callbacks.is_empty() {
            return;
        }
        let paths = caret_paths(dom, selection);
        for callback in &mut self.callbacks {
            callback(dom, &paths);
        }
    }
}

/// Ancestor chain of the selection start followed by the nodes only the
/// end's chain (or the other selected cells) adds.
pub fn caret_paths(dom: &Dom, selection: &Selection) -> Vec<NodeId> {
    let mut paths: Vec<NodeId> = Vec::new();
    let cells = selection.live_cells(dom);
    let chains: Vec<Vec<NodeId>> = if cells.is_empty() {
        match Caret::get(dom, selection) {
            Some(caret) => vec![caret.start.path, caret.end.path],
            None => Vec::new(),
        }
    } else {
        cells.iter().map(|&cell| dom.ancestors(cell)).collect()
    };
    for node in chains.into_iter().flatten() {
        if !paths.contains(&node) {
            paths.push(node);
        }
    }
    paths
}
