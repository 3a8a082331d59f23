use std::fmt::Display;

use ash::vk;

use super::CompiledBindingPlan;

/// Builds pipeline cache names.
///
/// Every component is escaped before it is joined, so distinct inputs always give
/// distinct names. Callers must feed in everything that affects the compiled object.
#[derive(Debug, Clone)]
pub struct PipelineKey {
    name: String,
}

impl PipelineKey {
    pub fn graphics() -> Self {
        Self {
            name: String::from("gfx"),
        }
    }
    pub fn compute() -> Self {
        Self {
            name: String::from("cs"),
        }
    }

    fn push(&mut self, tag: &str, value: &str) {
        self.name.push('|');
        self.name.push_str(tag);
        self.name.push('=');
        for c in value.chars() {
            if matches!(c, '|' | '=' | '\\') {
                self.name.push('\\');
            }
            self.name.push(c);
        }
    }

    /// Adds a shader stage, identified by the shader's own name or content hash.
    pub fn stage(mut self, stage: vk::ShaderStageFlags, shader: &str, entry_point: &str) -> Self {
        self.push("stage", &stage.as_raw().to_string());
        self.push("shader", shader);
        self.push("entry", entry_point);
        self
    }

    pub fn plan(mut self, plan: &CompiledBindingPlan) -> Self {
        self.push("plan", &plan.signature());
        self
    }

    /// Adds a piece of fixed-function state.
    pub fn state(mut self, label: &str, value: impl Display) -> Self {
        self.push("state", label);
        self.push("value", &value.to_string());
        self
    }

    pub fn build(self) -> String {
        self.name
    }
}
