#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use loomwork::component::{Component, ComponentError};
use loomwork::execution::{ExecutionContext, SetupContext};
use loomwork::schema::Field;
use loomwork::types::ExecutionResult;

/// Component whose `execute` always errors.
pub struct FailingComponent;

#[async_trait]
impl Component for FailingComponent {
    fn name(&self) -> &str {
        "failing"
    }

    fn label(&self) -> &str {
        "Always fails"
    }

    fn configuration(&self) -> Vec<Field> {
        Vec::new()
    }

    async fn execute(&self, _ctx: &mut ExecutionContext) -> Result<(), ComponentError> {
        Err(ComponentError::Failed("boom".into()))
    }
}

/// Component that reports a domain failure through the context.
pub struct DomainFailComponent;

#[async_trait]
impl Component for DomainFailComponent {
    fn name(&self) -> &str {
        "domain-fail"
    }

    fn label(&self) -> &str {
        "Domain failure"
    }

    fn configuration(&self) -> Vec<Field> {
        Vec::new()
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ComponentError> {
        ctx.fail(ExecutionResult::Failed, "predicate did not match");
        Ok(())
    }
}

/// Component whose first `setup` fails and later ones succeed.
pub struct FlakySetupComponent {
    recovered: AtomicBool,
}

impl FlakySetupComponent {
    pub fn new() -> Self {
        Self {
            recovered: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Component for FlakySetupComponent {
    fn name(&self) -> &str {
        "flaky-setup"
    }

    fn label(&self) -> &str {
        "Flaky setup"
    }

    fn configuration(&self) -> Vec<Field> {
        Vec::new()
    }

    async fn setup(&self, _ctx: &mut SetupContext) -> Result<(), ComponentError> {
        if self.recovered.swap(true, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ComponentError::Failed("credentials rejected".into()))
        }
    }

    async fn execute(&self, _ctx: &mut ExecutionContext) -> Result<(), ComponentError> {
        Ok(())
    }
}
