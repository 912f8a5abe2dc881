//! Pass-through component: emits its input event onward unchanged.
//!
//! The smallest real component, and the workhorse of the integration
//! tests.

use async_trait::async_trait;

use super::{Component, ComponentError};
use crate::execution::context::ExecutionContext;
use crate::schema::Field;
use crate::types::DEFAULT_CHANNEL;

pub struct NoopComponent;

#[async_trait]
impl Component for NoopComponent {
    fn name(&self) -> &str {
        "noop"
    }

    fn label(&self) -> &str {
        "No-op"
    }

    fn description(&self) -> &str {
        "Forwards the input event to the default output channel."
    }

    fn configuration(&self) -> Vec<Field> {
        Vec::new()
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ComponentError> {
        let data = ctx.data().clone();
        ctx.emit(DEFAULT_CHANNEL, "noop.finished", vec![data]);
        Ok(())
    }
}
