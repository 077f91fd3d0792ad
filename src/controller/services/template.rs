//! Process-wide template cache for domain and path templates
//!
//! Templates are written with Go-style field references (`{{ .Name }}`) and
//! rendered with minijinja. Each distinct template text is translated and
//! compiled once; later renders reuse the compiled form.

use minijinja::{Environment, UndefinedBehavior};
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::{LazyLock, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to parse template {template:?}: {source}")]
    Parse {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render template {template:?}: {source}")]
    Render {
        template: String,
        #[source]
        source: minijinja::Error,
    },
}

static TEMPLATES: LazyLock<RwLock<Environment<'static>>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    RwLock::new(env)
});

#[allow(clippy::expect_used)]
static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\{\{-?)(.*?)(-?\}\})").expect("action regex should compile"));

#[allow(clippy::expect_used)]
static FIELD_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s(|,])\.([A-Za-z_][A-Za-z0-9_]*)").expect("field regex should compile")
});

/// Rewrite Go-style `.Field` references inside `{{ }}` actions to bare names
pub fn translate(source: &str) -> String {
    ACTION
        .replace_all(source, |caps: &Captures| {
            let inner = FIELD_REF.replace_all(&caps[2], "${1}${2}");
            format!("{}{}{}", &caps[1], inner, &caps[3])
        })
        .into_owned()
}

/// Compile a template into the cache, returning a parse error if it is invalid
pub fn compile(source: &str) -> Result<(), TemplateError> {
    {
        let env = TEMPLATES.read().unwrap_or_else(|e| e.into_inner());
        if env.get_template(source).is_ok() {
            return Ok(());
        }
    }

    let mut env = TEMPLATES.write().unwrap_or_else(|e| e.into_inner());
    // Another reconcile may have compiled it between the two locks
    if env.get_template(source).is_ok() {
        return Ok(());
    }
    env.add_template_owned(source.to_string(), translate(source))
        .map_err(|source_err| TemplateError::Parse {
            template: source.to_string(),
            source: source_err,
        })?;
    debug!(template = %source, "Compiled template");
    Ok(())
}

/// Render a template against a serializable value set
pub fn render<S: Serialize>(source: &str, values: &S) -> Result<String, TemplateError> {
    compile(source)?;

    let env = TEMPLATES.read().unwrap_or_else(|e| e.into_inner());
    let tmpl = env
        .get_template(source)
        .map_err(|source_err| TemplateError::Parse {
            template: source.to_string(),
            source: source_err,
        })?;
    tmpl.render(values).map_err(|source_err| TemplateError::Render {
        template: source.to_string(),
        source: source_err,
    })
}
