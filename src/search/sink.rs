//! Consumers of search output.
//!
//! A [`ResultSink`] receives matches, a [`ProgressReporter`] receives
//! coarse per-file progress and is where cancellation is requested.

use super::walker::MatchResult;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Where an activated result should open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// File to open.
    pub file: PathBuf,
    /// 1-based line.
    pub line: u32,
    /// 0-based column.
    pub column: u32,
}

impl From<&MatchResult> for Location {
    fn from(result: &MatchResult) -> Self {
        Self {
            file: result.file.clone(),
            line: result.line,
            column: result.column,
        }
    }
}

/// Callback run when a result is activated.
pub type Activation = Box<dyn FnMut(&Location) + Send>;

/// Handle to one delivered result.
pub struct ResultHandle {
    location: Location,
    on_activate: Option<Activation>,
}

impl ResultHandle {
    /// Handle for the result at `location`.
    pub fn new(location: Location) -> Self {
        Self {
            location,
            on_activate: None,
        }
    }

    /// Location of the result.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Install the activation callback, replacing any previous one.
    pub fn set_activation(&mut self, callback: impl FnMut(&Location) + Send + 'static) {
        self.on_activate = Some(Box::new(callback));
    }

    /// Run the activation callback. Returns whether one was installed.
    pub fn activate(&mut self) -> bool {
        match self.on_activate.as_mut() {
            Some(callback) => {
                callback(&self.location);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("location", &self.location)
            .field("activatable", &self.on_activate.is_some())
            .finish()
    }
}

/// Receives the matches of a search.
pub trait ResultSink {
    /// Drop results of any earlier search.
    fn clear(&mut self);

    /// Make the sink visible.
    fn present(&mut self);

    /// Deliver one match. Sinks that support activation return the handle
    /// of the stored result.
    fn add_result(&mut self, result: &MatchResult) -> Option<&mut ResultHandle>;
}

/// Determinate progress indicator.
pub trait ProgressReporter {
    /// Range of values to expect.
    fn set_range(&mut self, min: usize, max: usize);

    /// Current value and a description of the work in progress.
    fn set_value_and_text(&mut self, value: usize, text: &str);

    /// Current value.
    fn set_value(&mut self, value: usize);

    /// Whether the user asked to stop.
    fn is_cancel_requested(&self) -> bool {
        false
    }
}

/// Progress reporter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn set_range(&mut self, _min: usize, _max: usize) {}

    fn set_value_and_text(&mut self, _value: usize, _text: &str) {}

    fn set_value(&mut self, _value: usize) {}
}

/// Sink that keeps every result in delivery order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Vec<(MatchResult, ResultHandle)>,
    presented: bool,
    clears: usize,
}

impl CollectingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results in delivery order.
    pub fn results(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().map(|(result, _)| result)
    }

    /// Handle of the `index`th result.
    pub fn handle_mut(&mut self, index: usize) -> Option<&mut ResultHandle> {
        self.results.get_mut(index).map(|(_, handle)| handle)
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether [`present`](ResultSink::present) was called.
    pub fn presented(&self) -> bool {
        self.presented
    }

    /// Number of [`clear`](ResultSink::clear) calls.
    pub fn clears(&self) -> usize {
        self.clears
    }

    /// Take the results, leaving the sink empty.
    pub fn into_results(self) -> Vec<MatchResult> {
        self.results.into_iter().map(|(result, _)| result).collect()
    }
}

impl ResultSink for CollectingSink {
    fn clear(&mut self) {
        self.results.clear();
        self.clears += 1;
    }

    fn present(&mut self) {
        self.presented = true;
    }

    fn add_result(&mut self, result: &MatchResult) -> Option<&mut ResultHandle> {
        self.results
            .push((result.clone(), ResultHandle::new(Location::from(result))));
        self.results.last_mut().map(|(_, handle)| handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn sample() -> MatchResult {
        MatchResult {
            file: PathBuf::from("/p/b.cpp"),
            line: 3,
            line_text: "  foo();".to_string(),
            column: 2,
            length: 3,
        }
    }

    #[test]
    fn test_collecting_sink_activation_carries_location() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut sink = CollectingSink::new();
        sink.clear();
        sink.present();

        let seen = Arc::clone(&opened);
        sink.add_result(&sample())
            .unwrap()
            .set_activation(move |loc| seen.lock().unwrap().push(loc.clone()));
        assert!(sink.handle_mut(0).unwrap().activate());

        let opened = opened.lock().unwrap();
        assert_eq!(
            opened.as_slice(),
            &[Location {
                file: PathBuf::from("/p/b.cpp"),
                line: 3,
                column: 2,
            }]
        );
        assert!(sink.presented());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_handle_without_activation() {
        let mut handle = ResultHandle::new(Location::from(&sample()));
        assert!(!handle.activate());
        assert_eq!(handle.location().line, 3);
    }
}
