//! minijinja-backed [`TemplateEngine`].
//!
//! Templates see the data context through a root object with case-insensitive
//! lookup. Sections are reachable from the helpers below through a reserved
//! root key:
//!
//! ```text
//! {% filter definesection("scripts", mode="append") %}<script>..</script>{% endfilter %}
//! {{ rendersection("scripts", required=false) }}
//! {% if issectiondefined("sidebar") %}..{% endif %}
//! ```

use std::error::Error as _;
use std::sync::Arc;

use minijinja::value::{Enumerator, Kwargs, Object, Value};
use minijinja::{Environment, Error, ErrorKind, State};

use crate::application::engine::TemplateEngine;
use crate::domain::context::{DataContext, RenderContext};
use crate::domain::sections::{SectionMode, Sections};
use crate::domain::template::{RenderFn, TemplateError};

const SECTIONS_KEY: &str = "__vellum_sections";

/// Site-wide minijinja environment; groups work on clones.
#[derive(Clone)]
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl Default for JinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl JinjaEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("definesection", define_section);
        env.add_function("rendersection", render_section);
        env.add_function("issectiondefined", is_section_defined);
        Self { env }
    }

    /// Register site-wide functions, filters, tests or globals.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }

    /// Register a site-wide template. It shadows group partials of the same name.
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        TemplateEngine::register_partial(self, name, source)
    }
}

impl TemplateEngine for JinjaEngine {
    fn fork(&self) -> Box<dyn TemplateEngine> {
        Box::new(self.clone())
    }

    fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    fn register_partial(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        self.env
            .add_template_owned(name.to_string(), source.to_string())
            .map_err(|err| TemplateError::compile(name, describe(&err)))
    }

    fn compile(&self, path: &str, source: &str) -> Result<RenderFn, TemplateError> {
        let mut env = self.env.clone();
        env.add_template_owned(path.to_string(), source.to_string())
            .map_err(|err| TemplateError::compile(path, describe(&err)))?;
        let name = path.to_string();
        Ok(Arc::new(move |context: &RenderContext| {
            let template = env
                .get_template(&name)
                .map_err(|err| TemplateError::render(&name, describe(&err)))?;
            template
                .render(RootContext::value(context))
                .map_err(|err| TemplateError::render(&name, describe(&err)))
        }))
    }
}

/// Root of the template context.
#[derive(Debug)]
struct RootContext {
    data: DataContext,
    sections: Arc<Sections>,
}

impl RootContext {
    fn value(context: &RenderContext) -> Value {
        Value::from_object(Self {
            data: context.data().clone(),
            sections: Arc::clone(context.sections()),
        })
    }
}

impl Object for RootContext {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str()?;
        if name == SECTIONS_KEY {
            return Some(Value::from_object(SectionsHandle(Arc::clone(&self.sections))));
        }
        self.data.get(name).map(Value::from_serialize)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.data.iter().map(|(name, _)| Value::from(name)).collect())
    }
}

#[derive(Debug)]
struct SectionsHandle(Arc<Sections>);

impl Object for SectionsHandle {}

fn sections(state: &State) -> Result<Arc<SectionsHandle>, Error> {
    state
        .lookup(SECTIONS_KEY)
        .and_then(|value| value.downcast_object::<SectionsHandle>())
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                "sections are only available while rendering a view",
            )
        })
}

fn invalid(err: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, err.to_string())
}

fn define_section(
    state: &State,
    content: String,
    name: String,
    kwargs: Kwargs,
) -> Result<String, Error> {
    let mode: Option<String> = kwargs.get("mode")?;
    kwargs.assert_all_used()?;
    let mode = match mode {
        Some(mode) => mode.parse::<SectionMode>().map_err(invalid)?,
        None => SectionMode::default(),
    };
    sections(state)?
        .0
        .define(&name, &content, mode)
        .map_err(invalid)?;
    Ok(String::new())
}

fn render_section(state: &State, name: String, kwargs: Kwargs) -> Result<Value, Error> {
    let required: Option<bool> = kwargs.get("required")?;
    kwargs.assert_all_used()?;
    let content = sections(state)?
        .0
        .render(&name, required.unwrap_or(true))
        .map_err(invalid)?;
    Ok(Value::from_safe_string(content.unwrap_or_default()))
}

fn is_section_defined(state: &State, name: String) -> Result<bool, Error> {
    Ok(sections(state)?.0.is_defined(&name))
}

/// Error text including the chain of causes.
fn describe(err: &Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
