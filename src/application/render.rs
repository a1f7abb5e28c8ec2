//! Composition of a view with its layout chain.

use std::sync::Arc;

use tracing::trace;

use super::error::ViewError;
use crate::domain::context::{BODY_KEY, DataContext, RenderContext};
use crate::domain::template::CompiledTemplate;

/// Renders a view, then feeds each layout the previous output as `body`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositionRenderer;

impl CompositionRenderer {
    /// `layouts` is innermost first.
    pub fn render(
        &self,
        view: &CompiledTemplate,
        layouts: &[Arc<CompiledTemplate>],
        data: &DataContext,
    ) -> Result<String, ViewError> {
        let mut context = RenderContext::new(data.clone());
        let mut html = view.render(&context)?;
        for layout in layouts {
            trace!(target: "vellum::api", layout = %layout.path(), "Applying layout");
            context.data_mut().insert(BODY_KEY, html);
            html = layout.render(&context)?;
        }
        Ok(html)
    }
}

/// A resolved view and the layouts wrapping it, innermost first.
#[derive(Debug, Clone)]
pub struct ResolvedView {
    view: Arc<CompiledTemplate>,
    layouts: Vec<Arc<CompiledTemplate>>,
}

impl ResolvedView {
    pub(crate) fn new(view: Arc<CompiledTemplate>, layouts: Vec<Arc<CompiledTemplate>>) -> Self {
        Self { view, layouts }
    }

    pub fn view(&self) -> &CompiledTemplate {
        &self.view
    }

    pub fn layouts(&self) -> &[Arc<CompiledTemplate>] {
        &self.layouts
    }

    /// Paths of the view and every layout, innermost first.
    pub fn chain(&self) -> Vec<&str> {
        std::iter::once(self.view.path())
            .chain(self.layouts.iter().map(|layout| layout.path()))
            .collect()
    }

    pub fn render(&self, data: &DataContext) -> Result<String, ViewError> {
        CompositionRenderer.render(&self.view, &self.layouts, data)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::domain::template::{RenderFn, TemplateError};

    fn template(path: &str, render: RenderFn) -> Arc<CompiledTemplate> {
        Arc::new(CompiledTemplate::new(path, render, None, None))
    }

    fn body_of(ctx: &RenderContext) -> String {
        ctx.data()
            .get(BODY_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn layouts_wrap_innermost_first() {
        let view = template("view", Arc::new(|_: &RenderContext| Ok("v".to_string())));
        let inner = template(
            "inner",
            Arc::new(|ctx: &RenderContext| Ok(format!("a({})", body_of(ctx)))),
        );
        let outer = template(
            "outer",
            Arc::new(|ctx: &RenderContext| Ok(format!("b({})", body_of(ctx)))),
        );
        let resolved = ResolvedView::new(view, vec![inner, outer]);

        assert_eq!(resolved.render(&DataContext::new()).unwrap(), "b(a(v))");
        assert_eq!(resolved.chain(), vec!["view", "inner", "outer"]);
    }

    #[test]
    fn render_errors_stop_composition() {
        let view = template(
            "view",
            Arc::new(|_: &RenderContext| Err(TemplateError::render("view", "boom"))),
        );
        let layout = template(
            "layout",
            Arc::new(|_: &RenderContext| -> Result<String, TemplateError> {
                panic!("layout must not render")
            }),
        );
        let error = CompositionRenderer
            .render(&view, &[layout], &DataContext::new())
            .unwrap_err();
        assert!(matches!(error, ViewError::Render(TemplateError::Render { .. })));
    }
}
