//! Manifest composer
//!
//! Turns a [`CompositionContext`] into a [`ManifestBundle`] without touching
//! anything outside the process:
//!
//! 1. select the catalog version named by the context
//! 2. plan which (kind, role) pairs to render
//! 3. fix every manifest name up front
//! 4. render each entry: skeleton, then fragments in stage order, then
//!    cross-references pointing at the names fixed in step 3
//! 5. check that every reference resolves inside the bundle
//!
//! The same context always produces byte-identical output.

mod references;
mod render;

use capzctl_common::{Error, Result};
use tracing::debug;

use crate::catalog::TemplateCatalog;
use crate::context::CompositionContext;
use crate::custom;
use crate::manifest::ManifestBundle;

pub use references::{object_refs, validate_references, ObjectRef};

/// Composes bundles from a template catalog
#[derive(Clone, Debug, Default)]
pub struct Composer {
    catalog: TemplateCatalog,
}

impl Composer {
    /// Composer over the given catalog
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    /// The catalog in use
    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Compose the bundle for a context
    pub fn compose(&self, ctx: &CompositionContext) -> Result<ManifestBundle> {
        let bundle = match &ctx.custom_template {
            Some(template) => custom::render_bundle(template, ctx)?,
            None => self.compose_from_catalog(ctx)?,
        };
        validate_references(&bundle)?;
        debug!(
            cluster = %ctx.cluster_name,
            schema = %ctx.schema_version,
            manifests = bundle.len(),
            "Composed manifest bundle"
        );
        Ok(bundle)
    }

    fn compose_from_catalog(&self, ctx: &CompositionContext) -> Result<ManifestBundle> {
        let version = self.catalog.version(ctx.schema_version).map_err(|_| {
            Error::composition(format!(
                "catalog has no templates for schema version {}",
                ctx.schema_version
            ))
        })?;
        if !version.supports(ctx.os_family, ctx.topology) {
            return Err(Error::composition(format!(
                "{:?} workers are not supported with {:?} in schema {}",
                ctx.os_family, ctx.topology, ctx.schema_version
            )));
        }

        let plan = version.plan(ctx);
        let vars = ctx.variables();
        let names = render::NameTable::build(version, ctx, &vars, &plan)?;

        let mut bundle = ManifestBundle::new();
        for planned in &plan {
            let manifest = render::render_entry(version, ctx, &vars, &names, planned)?;
            bundle.push(planned.key.clone(), manifest)?;
        }
        Ok(bundle)
    }
}

/// Compose a bundle with the built-in catalog
pub fn compose(ctx: &CompositionContext) -> Result<ManifestBundle> {
    Composer::default().compose(ctx)
}
