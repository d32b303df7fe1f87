//! Turning raw imported object names into graph modules.

use std::collections::HashSet;

use crate::module::{Module, is_descendant_name};

/// Convert a possibly-relative object name to an absolute one.
///
/// In a package's `__init__`, one leading dot means the package itself; in a
/// plain module it means the module's parent. Each further dot climbs one
/// level. Returns `None` if the dots climb above the top-level package.
pub(super) fn absolute_object_name(
    module: &Module,
    is_package: bool,
    object_name: &str,
) -> Option<String> {
    let dots = object_name.chars().take_while(|&c| c == '.').count();
    if dots == 0 {
        return Some(object_name.to_string());
    }

    let segments: Vec<&str> = module.segments().collect();
    let drop = if is_package { dots - 1 } else { dots };
    if drop >= segments.len() {
        return None;
    }
    let base = segments[..segments.len() - drop].join(".");
    Some(format!("{base}.{}", &object_name[dots..]))
}

/// The internal module an object lives in: the object itself if it is a
/// module, otherwise its parent if that is a module.
pub(super) fn internal_module(object_name: &str, modules: &HashSet<Module>) -> Option<Module> {
    if let Some(module) = modules.get(object_name) {
        return Some(module.clone());
    }
    let (parent, _) = object_name.rsplit_once('.')?;
    modules.get(parent).cloned()
}

/// Reduce an external object name to the node that should represent it.
///
/// Normally this is the top-level package (`django.db.models` becomes
/// `django`). When the name shares a namespace with an internal package, the
/// shallowest portion that does not clash is used instead: with internal
/// `foo.blue.beta`, `foo.blue.alpha.one` becomes `foo.blue.alpha`. Where
/// several internal packages share the namespace, the deepest portion wins.
///
/// Returns `None` for a namespace that contains an internal package, and for
/// names beneath an internal package that did not resolve to a module.
pub(super) fn distill_external_module(
    object_name: &str,
    package_names: &[Module],
) -> Option<Module> {
    let overlaps_internal = package_names.iter().any(|package| {
        let package = package.as_str();
        package == object_name
            || is_descendant_name(package, object_name)
            || is_descendant_name(object_name, package)
    });
    if overlaps_internal {
        return None;
    }

    let external: Vec<&str> = object_name.split('.').collect();
    let root = external[0];

    let mut sorted: Vec<&Module> = package_names.iter().collect();
    sorted.sort();
    let portion = sorted
        .into_iter()
        .filter(|package| is_descendant_name(package.as_str(), root))
        .filter_map(|package| {
            let shared = package
                .segments()
                .zip(&external)
                .take_while(|(internal, external)| internal == *external)
                .count();
            (shared < external.len()).then(|| external[..=shared].join("."))
        })
        .max_by_key(|portion| portion.matches('.').count())
        .unwrap_or_else(|| root.to_string());

    Module::new(portion).ok()
}
