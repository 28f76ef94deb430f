//! A passthrough [`Interpreter`]: used wherever a test's producer already
//! hands over fully-formed `Indexable<D>` values and has no raw event
//! format of its own to translate.

use crate::{engine::Interpreter, error::CoreError, event::Indexable};

#[derive(Debug, Default)]
pub struct PassthroughInterpreter;

impl<D: Send + Sync> Interpreter<Indexable<D>, D> for PassthroughInterpreter {
    fn interpret(&self, value: Indexable<D>) -> Result<Indexable<D>, CoreError> {
        Ok(value)
    }
}
