//! Evaluation state carried through the recursive IR walk.

use crate::interpreter::EvalError;
use crate::types::{Params, Scratch, Value};

/// The frame of one evaluation scope: the parameter map, the current value,
/// and whether a per-element value is live (which is what `$v` and a bare
/// `<:/>` resolve against).
#[derive(Debug)]
pub(crate) struct Frame {
    pub params: Params,
    pub value: Value,
    pub element: bool,
}

impl Frame {
    pub fn new(params: Params) -> Frame {
        Frame {
            params,
            value: Value::Empty,
            element: false,
        }
    }
}

/// Cross-scope state for one `evaluate` call.
///
/// Tracks the private scratchpad shared by every fragment invocation, the
/// include stack for cycle detection, and the nesting depth of includes and
/// `<:eval>` re-evaluations.
pub(crate) struct EvalContext<'a> {
    scratch: &'a mut Scratch,
    include_stack: Vec<String>,
    depth: usize,
    max_depth: usize,
}

impl<'a> EvalContext<'a> {
    /// Create a context around a caller-supplied scratchpad.
    pub fn new(scratch: &'a mut Scratch) -> EvalContext<'a> {
        EvalContext {
            scratch,
            include_stack: Vec::new(),
            depth: 0,
            max_depth: 64,
        }
    }

    pub fn scratch(&mut self) -> &mut Scratch {
        self.scratch
    }

    /// Enter a nested evaluation (an include or an `<:eval>`).
    pub fn enter(&mut self) -> Result<(), EvalError> {
        if self.depth >= self.max_depth {
            return Err(EvalError::DepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave a nested evaluation.
    pub fn leave(&mut self) {
        if self.depth > 0 {
            self.depth -= 1;
        }
    }

    /// Push an include onto the stack, detecting cycles by template name.
    pub fn push_include(&mut self, name: &str) -> Result<(), EvalError> {
        if self.include_stack.iter().any(|n| n == name) {
            let mut chain = self.include_stack.clone();
            chain.push(name.to_string());
            return Err(EvalError::IncludeCycle { chain });
        }
        self.enter()?;
        self.include_stack.push(name.to_string());
        Ok(())
    }

    /// Pop an include from the stack.
    pub fn pop_include(&mut self) {
        self.include_stack.pop();
        self.leave();
    }
}
