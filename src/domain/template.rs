//! Compiled templates and layout declarations.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::context::RenderContext;

/// Opening marker of a layout declaration on the first line of a template.
pub const LAYOUT_MARKER_OPEN: &str = "{#<";
/// Closing marker of a layout declaration.
pub const LAYOUT_MARKER_CLOSE: &str = "#}";

static LAYOUT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("layout name pattern is valid")
});

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("failed to compile `{name}`: {message}")]
    Compile { name: String, message: String },
    #[error("failed to render `{name}`: {message}")]
    Render { name: String, message: String },
}

impl TemplateError {
    pub fn compile(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn render(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Render function produced by a template engine.
pub type RenderFn = Arc<dyn Fn(&RenderContext) -> Result<String, TemplateError> + Send + Sync>;

/// Layout declared at the very start of a template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutDeclaration {
    Absent,
    Named(String),
    /// A marker was present but its content is not an identifier.
    Malformed(String),
}

impl LayoutDeclaration {
    /// Inspect the leading bytes of `source` for `{#< name #}`.
    pub fn scan(source: &str) -> Self {
        let Some(rest) = source.strip_prefix(LAYOUT_MARKER_OPEN) else {
            return Self::Absent;
        };
        let Some(end) = rest.find(LAYOUT_MARKER_CLOSE) else {
            return Self::Malformed(rest.lines().next().unwrap_or_default().trim().to_string());
        };
        let name = rest[..end].trim();
        if LAYOUT_NAME.is_match(name) {
            Self::Named(name.to_string())
        } else {
            Self::Malformed(name.to_string())
        }
    }
}

/// A template compiled for one group.
///
/// `fingerprint` is present exactly when the backing store could not supply a
/// change token for the file at compile time.
#[derive(Clone)]
pub struct CompiledTemplate {
    path: String,
    render: RenderFn,
    fingerprint: Option<String>,
    layout: Option<String>,
}

impl CompiledTemplate {
    pub fn new(
        path: impl Into<String>,
        render: RenderFn,
        fingerprint: Option<String>,
        layout: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            render,
            fingerprint,
            layout,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Layout named by the template's own declaration.
    pub fn layout(&self) -> Option<&str> {
        self.layout.as_deref()
    }

    pub fn render(&self, context: &RenderContext) -> Result<String, TemplateError> {
        (self.render)(context)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("path", &self.path)
            .field("fingerprint", &self.fingerprint)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_valid_declaration() {
        assert_eq!(
            LayoutDeclaration::scan("{#< main #}\n<p>hi</p>"),
            LayoutDeclaration::Named("main".to_string())
        );
        assert_eq!(
            LayoutDeclaration::scan("{#<_site_2#}"),
            LayoutDeclaration::Named("_site_2".to_string())
        );
    }

    #[test]
    fn declaration_must_lead_the_source() {
        assert_eq!(
            LayoutDeclaration::scan("\n{#< main #}"),
            LayoutDeclaration::Absent
        );
        assert_eq!(LayoutDeclaration::scan("{# note #}"), LayoutDeclaration::Absent);
    }

    #[test]
    fn malformed_names_are_reported() {
        assert_eq!(
            LayoutDeclaration::scan("{#< ../main #}"),
            LayoutDeclaration::Malformed("../main".to_string())
        );
        assert_eq!(
            LayoutDeclaration::scan("{#< 9lives #}"),
            LayoutDeclaration::Malformed("9lives".to_string())
        );
        assert_eq!(
            LayoutDeclaration::scan("{#< main\nbody"),
            LayoutDeclaration::Malformed("main".to_string())
        );
    }

    #[test]
    fn render_delegates_to_function() {
        let render: RenderFn = Arc::new(|ctx: &RenderContext| Ok(format!("{}", ctx.data().len())));
        let template = CompiledTemplate::new("~/Views/Home/Index.hbs", render, None, None);
        let output = template
            .render(&RenderContext::new(Default::default()))
            .unwrap();
        assert_eq!(output, "0");
        assert_eq!(template.layout(), None);
    }
}
