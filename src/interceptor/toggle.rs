// SPDX-License-Identifier: Apache-2.0

//! Interception toggle
//!
//! Carried explicitly by each caller rather than kept in thread-local state.
//! Disabling applies to exactly one statement: the pipeline consumes the
//! toggle and it is enabled again for whatever comes next.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterceptionToggle {
    #[default]
    Enabled,
    Disabled,
}

/// Per-call-chain state threaded into the pipeline
#[derive(Debug, Default)]
pub struct CallContext {
    toggle: InterceptionToggle,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips interception for the next statement only
    pub fn disable_next(&mut self) -> &mut Self {
        self.toggle = InterceptionToggle::Disabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.toggle == InterceptionToggle::Enabled
    }

    /// Reads the toggle and resets it to enabled
    pub(crate) fn consume(&mut self) -> InterceptionToggle {
        std::mem::take(&mut self.toggle)
    }
}
