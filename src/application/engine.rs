use crate::domain::context::RenderContext;
use crate::domain::template::{RenderFn, TemplateError};

/// Template engine seam.
///
/// One site-wide instance holds templates and helpers registered by the
/// application; every group works on a fork of it with its own partials.
pub trait TemplateEngine: Send + Sync {
    /// Copy of this engine; registrations on the copy do not leak back.
    fn fork(&self) -> Box<dyn TemplateEngine>;

    fn has_template(&self, name: &str) -> bool;

    fn register_partial(&mut self, name: &str, source: &str) -> Result<(), TemplateError>;

    /// Compile `source` against the templates currently registered. `path` names
    /// the template in errors.
    fn compile(&self, path: &str, source: &str) -> Result<RenderFn, TemplateError>;

    fn render(&self, render: &RenderFn, context: &RenderContext) -> Result<String, TemplateError> {
        render(context)
    }
}
