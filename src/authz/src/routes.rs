//! Route-to-permission mapping
//!
//! Maps `(path, method)` requests to the permissions required to pass.
//! Templates support `{param}` single-segment placeholders and a trailing
//! `{**rest}` catch-all. Lookup is exact-match first, then templates ordered
//! by specificity. An unmapped route yields no configuration, which the
//! engine treats as deny.
//!
//! The table is swapped atomically behind a lock so mutations become visible
//! to in-flight lookups immediately without blocking them.

use crate::error::{AuthzError, Result};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Permission requirements for one route template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePermission {
    /// Template, e.g. `/api/users/{id}` or `/static/{**path}`
    pub template: String,
    /// Route is open to unauthenticated callers; permissions are not checked
    #[serde(default)]
    pub allow_anonymous: bool,
    /// Authentication is required even when no method permissions are listed
    #[serde(default = "default_true")]
    pub require_authentication: bool,
    /// When non-empty, the caller must hold at least one of these roles
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// HTTP method (uppercase) to required permission names. A method with an
    /// empty list requires authentication only. A method absent from the map
    /// is not configured and is denied.
    #[serde(default)]
    pub method_permissions: HashMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

struct CompiledRoute {
    spec: RoutePermission,
    regex: Regex,
    /// Count of literal (non-placeholder) characters, for specificity ordering
    literal_chars: usize,
    placeholder_count: usize,
}

#[derive(Default)]
struct RouteTable {
    /// Lowercased literal path -> spec, checked before templates
    exact: HashMap<String, Arc<RoutePermission>>,
    /// Templates sorted most-specific first
    templates: Vec<Arc<CompiledRoute>>,
}

/// Compile a route template into an anchored case-insensitive regex.
fn compile_template(template: &str) -> Result<(Regex, usize, usize)> {
    if !template.starts_with('/') {
        return Err(AuthzError::ValidationFailed(format!(
            "route template must start with '/': '{}'",
            template
        )));
    }

    let mut pattern = String::from("(?i)^");
    let mut literal_chars = 0usize;
    let mut placeholders = 0usize;
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let (literal, tail) = rest.split_at(open);
        pattern.push_str(&regex::escape(literal));
        literal_chars += literal.len();

        let close = tail.find('}').ok_or_else(|| {
            AuthzError::ValidationFailed(format!("unclosed placeholder in '{}'", template))
        })?;
        let name = &tail[1..close];
        if name.starts_with("**") {
            if close + 1 != tail.len() {
                return Err(AuthzError::ValidationFailed(format!(
                    "catch-all placeholder must be the final segment in '{}'",
                    template
                )));
            }
            pattern.push_str(".*");
        } else {
            pattern.push_str("[^/]+");
        }
        placeholders += 1;
        rest = &tail[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    literal_chars += rest.len();
    pattern.push('$');

    let regex = Regex::new(&pattern)
        .map_err(|e| AuthzError::ValidationFailed(format!("invalid route template: {}", e)))?;
    Ok((regex, literal_chars, placeholders))
}

fn has_placeholder(template: &str) -> bool {
    template.contains('{')
}

/// The live route-permission table
pub struct RouteMapper {
    table: RwLock<Arc<RouteTable>>,
    /// Source specs, keyed by template, used to rebuild the table on mutation
    specs: RwLock<HashMap<String, RoutePermission>>,
}

impl RouteMapper {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(RouteTable::default())),
            specs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_routes(routes: Vec<RoutePermission>) -> Result<Self> {
        let mapper = Self::new();
        for route in routes {
            mapper.update_route_permission(route)?;
        }
        Ok(mapper)
    }

    /// Insert or replace the spec for a template. Visible to subsequent
    /// lookups as soon as this returns.
    pub fn update_route_permission(&self, spec: RoutePermission) -> Result<()> {
        compile_template(&spec.template)?;
        let mut specs = self.specs.write();
        specs.insert(spec.template.clone(), spec);
        self.rebuild(&specs)
    }

    pub fn remove_route(&self, template: &str) -> Result<()> {
        let mut specs = self.specs.write();
        if specs.remove(template).is_none() {
            return Err(AuthzError::Storage(format!(
                "route '{}' not found",
                template
            )));
        }
        self.rebuild(&specs)
    }

    fn rebuild(&self, specs: &HashMap<String, RoutePermission>) -> Result<()> {
        let mut table = RouteTable::default();
        for spec in specs.values() {
            if has_placeholder(&spec.template) {
                let (regex, literal_chars, placeholder_count) = compile_template(&spec.template)?;
                table.templates.push(Arc::new(CompiledRoute {
                    spec: spec.clone(),
                    regex,
                    literal_chars,
                    placeholder_count,
                }));
            } else {
                table
                    .exact
                    .insert(spec.template.to_ascii_lowercase(), Arc::new(spec.clone()));
            }
        }
        // Most literal chars first, then fewest placeholders, then template
        // text as the final stable tie-break
        table.templates.sort_by(|a, b| {
            b.literal_chars
                .cmp(&a.literal_chars)
                .then(a.placeholder_count.cmp(&b.placeholder_count))
                .then_with(|| a.spec.template.cmp(&b.spec.template))
        });
        *self.table.write() = Arc::new(table);
        Ok(())
    }

    /// Find the spec governing a request path. `None` means no configuration.
    pub fn lookup(&self, path: &str) -> Option<Arc<RoutePermission>> {
        let table = self.table.read().clone();
        if let Some(spec) = table.exact.get(&path.to_ascii_lowercase()) {
            return Some(spec.clone());
        }
        for route in &table.templates {
            if route.regex.is_match(path) {
                debug!(path, template = %route.spec.template, "route matched template");
                return Some(Arc::new(route.spec.clone()));
            }
        }
        None
    }

    pub fn route_count(&self) -> usize {
        self.specs.read().len()
    }
}

impl Default for RouteMapper {
    fn default() -> Self {
        Self::new()
    }
}
