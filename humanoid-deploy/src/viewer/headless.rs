use super::{Viewer, ViewerCapabilities, ViewerError, ViewerFrame};

/// No window. Counts frames and optionally "closes" after a fixed number.
#[derive(Debug, Default)]
pub struct HeadlessViewer {
    frames: usize,
    close_after: Option<usize>,
}

impl HeadlessViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closing_after(frames: usize) -> Self {
        Self {
            close_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Viewer for HeadlessViewer {
    fn capabilities(&self) -> ViewerCapabilities {
        ViewerCapabilities::default()
    }

    fn is_running(&self) -> bool {
        self.close_after.map_or(true, |limit| self.frames < limit)
    }

    fn sync(&mut self, _frame: &ViewerFrame) -> Result<(), ViewerError> {
        self.frames += 1;
        Ok(())
    }
}
