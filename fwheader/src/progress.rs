/// Progress update callbacks for long-running payload hashing
pub trait ProgressCallbacks {
    /// Initialize some progress report
    fn init(&mut self, total: usize);
    /// Update some progress report
    fn update(&mut self, current: usize);
    /// Finish some progress report
    fn finish(&mut self);
}
