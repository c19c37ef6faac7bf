//! Rule instantiation: [`RuleSpec`] → boxed [`Rule`].

use tracing::debug;

use super::{CoverageRule, FileExistsRule, Rule, RuleKind, RuleSpec, SemverRule};
use crate::error::ConfigError;

/// Constructor registered for a rule kind.
pub type RuleConstructor = fn(&RuleSpec) -> Result<Box<dyn Rule>, ConfigError>;

fn build_file_exists(spec: &RuleSpec) -> Result<Box<dyn Rule>, ConfigError> {
    Ok(Box::new(FileExistsRule::from_spec(spec)?))
}

fn build_coverage(spec: &RuleSpec) -> Result<Box<dyn Rule>, ConfigError> {
    Ok(Box::new(CoverageRule::from_spec(spec)?))
}

fn build_semver(spec: &RuleSpec) -> Result<Box<dyn Rule>, ConfigError> {
    Ok(Box::new(SemverRule::from_spec(spec)?))
}

/// Constructor for `kind`. Exhaustive over [`RuleKind`].
pub fn constructor(kind: RuleKind) -> RuleConstructor {
    match kind {
        RuleKind::FileExists => build_file_exists,
        RuleKind::Coverage => build_coverage,
        RuleKind::Semver => build_semver,
    }
}

/// The registration table, in [`RuleKind::ALL`] order.
pub fn registry() -> impl Iterator<Item = (RuleKind, RuleConstructor)> {
    RuleKind::ALL.into_iter().map(|kind| (kind, constructor(kind)))
}

/// Build a rule from its spec.
///
/// Fails with [`ConfigError::UnknownRuleKind`] for kinds outside the
/// registry and [`ConfigError::InvalidRuleParams`] for bad parameters.
pub fn instantiate(spec: &RuleSpec) -> Result<Box<dyn Rule>, ConfigError> {
    let kind: RuleKind = spec
        .kind
        .parse()
        .map_err(|_| ConfigError::UnknownRuleKind {
            rule: spec.name.clone(),
            kind: spec.kind.clone(),
        })?;
    debug!(rule = %spec.name, kind = %kind, "instantiating rule");
    constructor(kind)(spec)
}

/// Build every rule, failing on the first invalid spec.
pub fn instantiate_all(specs: &[RuleSpec]) -> Result<Vec<Box<dyn Rule>>, ConfigError> {
    specs.iter().map(instantiate).collect()
}
