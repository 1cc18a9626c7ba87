//! Slug naming convention.
//!
//! Every resource SiteGrid provisions for a project is named from the
//! project's slug, so teardown can still find them when no metadata
//! record survives:
//!
//! | Resource | Name |
//! |---|---|
//! | database | `{ident}_db` |
//! | database user | `{ident}_user` |
//! | backend process | `{slug}-backend` |
//! | frontend process | `{slug}-frontend` |
//! | route artifact | `{slug}.conf` |
//! | frontend domain | `{slug}.{base}` |
//! | backend domain | `{slug}-api.{base}` |
//!
//! `ident` is the slug with `-` replaced by `_` so it is a plain SQL
//! identifier.

use thiserror::Error;

/// Longest slug accepted. Keeps `{ident}_user` inside PostgreSQL's
/// 63-byte identifier limit.
pub const MAX_SLUG_LEN: usize = 48;

/// Longest SQL identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// The slug is not usable as a resource name root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid project slug {slug:?}: {reason}")]
pub struct InvalidSlug {
    pub slug: String,
    pub reason: &'static str,
}

/// Check that a slug is lowercase ASCII alphanumerics and single hyphens,
/// starting and ending with an alphanumeric.
pub fn validate_slug(slug: &str) -> Result<(), InvalidSlug> {
    let fail = |reason| {
        Err(InvalidSlug {
            slug: slug.to_string(),
            reason,
        })
    };

    if slug.is_empty() {
        return fail("empty");
    }
    if slug.len() > MAX_SLUG_LEN {
        return fail("too long");
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return fail("only a-z, 0-9 and '-' are allowed");
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return fail("must start and end with a letter or digit");
    }
    if slug.contains("--") {
        return fail("consecutive hyphens");
    }
    Ok(())
}

/// Whether `s` is a lowercase SQL identifier SiteGrid would have generated.
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_IDENTIFIER_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// SQL-safe form of a slug.
pub fn db_ident(slug: &str) -> String {
    slug.replace('-', "_")
}

/// Conventional database name for a slug.
pub fn database_name(slug: &str) -> String {
    format!("{}_db", db_ident(slug))
}

/// Conventional database user for a slug.
pub fn database_user(slug: &str) -> String {
    format!("{}_user", db_ident(slug))
}

/// Recover the identifier root from a conventional database name.
///
/// Returns `None` unless `name` is exactly `{ident}_db` with a
/// well-formed `ident`.
pub fn ident_from_database_name(name: &str) -> Option<&str> {
    let ident = name.strip_suffix("_db")?;
    (is_valid_identifier(ident) && name.len() <= MAX_IDENTIFIER_LEN).then_some(ident)
}

/// All names derived from one slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectNames {
    pub slug: String,
    pub database: String,
    pub database_user: String,
    pub backend_service: String,
    pub frontend_service: String,
    pub route_file: String,
    pub frontend_subdomain: String,
    pub backend_subdomain: String,
}

impl ProjectNames {
    pub fn for_slug(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            database: database_name(slug),
            database_user: database_user(slug),
            backend_service: format!("{slug}-backend"),
            frontend_service: format!("{slug}-frontend"),
            route_file: format!("{slug}.conf"),
            frontend_subdomain: slug.to_string(),
            backend_subdomain: format!("{slug}-api"),
        }
    }

    /// Public frontend hostname under `base_domain`.
    pub fn frontend_domain(&self, base_domain: &str) -> String {
        format!("{}.{}", self.frontend_subdomain, base_domain)
    }

    /// Public backend hostname under `base_domain`.
    pub fn backend_domain(&self, base_domain: &str) -> String {
        format!("{}.{}", self.backend_subdomain, base_domain)
    }
}
