use crate::models::{ItemProgress, OperationResult};

/// What a progress snapshot means for the item it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStep {
    /// Still running; the percent never decreases.
    Progress(u8),
    /// Reached 100% with a terminal result. Reported once per item.
    Finished(OperationResult),
    /// Out of range, or the item already finished.
    Ignored,
}

/// Per-item completion detection for one batch.
///
/// The engine's batch completion fires once, so an item is considered done when
/// its own percent reaches 100 and the snapshot carries its result.
#[derive(Debug, Clone)]
pub struct ItemTracker {
    percent: Vec<u8>,
    finished: Vec<bool>,
}

impl ItemTracker {
    pub fn new(len: usize) -> Self {
        Self {
            percent: vec![0; len],
            finished: vec![false; len],
        }
    }

    pub fn observe<P: ItemProgress>(&mut self, snapshot: &P) -> ItemStep {
        let index = snapshot.current_item_index();
        if index >= self.finished.len() || self.finished[index] {
            return ItemStep::Ignored;
        }

        let reported = snapshot.current_item_percent().clamp(0, 100) as u8;
        let percent = reported.max(self.percent[index]);
        self.percent[index] = percent;

        match (percent, snapshot.current_item_result()) {
            (100, Some(result)) => {
                self.finished[index] = true;
                ItemStep::Finished(result)
            }
            _ => ItemStep::Progress(percent),
        }
    }

    /// Mark an item finished from the batch result. Returns false if it already was.
    pub fn finish(&mut self, index: usize) -> bool {
        match self.finished.get_mut(index) {
            Some(done) if !*done => {
                *done = true;
                self.percent[index] = 100;
                true
            }
            _ => false,
        }
    }

    pub fn unfinished(&self) -> Vec<usize> {
        self.finished
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(index, _)| index)
            .collect()
    }
}
