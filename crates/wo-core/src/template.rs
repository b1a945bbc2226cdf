// ── Template rendering ──
//
// Renders host configuration files from a flat key/value context. The
// built-in templates ship inside the binary; an override directory may
// shadow any of them by file name.

use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Map, Value};
use strum::{EnumIter, IntoEnumIterator};
use tracing::debug;

use crate::error::{CoreError, IoContext};

/// Configuration files the engine renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Template {
    /// Shared systemd unit template, one per PHP version.
    PhpFpmUnit,
    /// Per-site FPM master config.
    PhpFpmMaster,
    /// Per-site FPM pool.
    PhpFpmPool,
    NginxVhost,
}

impl Template {
    /// File name of the template, also the name looked up in an override
    /// directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::PhpFpmUnit => "php-fpm-service.hbs",
            Self::PhpFpmMaster => "php-fpm-master.hbs",
            Self::PhpFpmPool => "php-fpm-pool.hbs",
            Self::NginxVhost => "nginx-vhost.hbs",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            Self::PhpFpmUnit => include_str!("../templates/php-fpm-service.hbs"),
            Self::PhpFpmMaster => include_str!("../templates/php-fpm-master.hbs"),
            Self::PhpFpmPool => include_str!("../templates/php-fpm-pool.hbs"),
            Self::NginxVhost => include_str!("../templates/nginx-vhost.hbs"),
        }
    }
}

/// Flat render context, built explicitly per call.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RenderContext(Map<String, Value>);

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    pub fn set_path(self, key: &str, path: &Path) -> Self {
        self.set(key, path.to_string_lossy().into_owned())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Text-out renderer. Sync: rendering never touches the network or
/// spawns processes.
pub trait TemplateRenderer {
    fn render(&self, template: Template, context: &RenderContext) -> Result<String, CoreError>;
}

/// Handlebars renderer without HTML escaping.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    /// Built-in templates only.
    pub fn builtin() -> Result<Self, CoreError> {
        Self::with_overrides(None)
    }

    /// Built-ins, each replaced by `<dir>/<file_name>` when that file exists.
    pub fn with_overrides(dir: Option<&Path>) -> Result<Self, CoreError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);

        for template in Template::iter() {
            let name = template.file_name();
            let overridden = dir.map(|d| d.join(name)).filter(|p| p.is_file());
            match overridden {
                Some(path) => {
                    let source = std::fs::read_to_string(&path).at(&path)?;
                    registry.register_template_string(name, source)?;
                    debug!(template = name, path = %path.display(), "using template override");
                }
                None => registry.register_template_string(name, template.builtin())?,
            }
        }
        Ok(Self { registry })
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, template: Template, context: &RenderContext) -> Result<String, CoreError> {
        Ok(self.registry.render(template.file_name(), context)?)
    }
}
