//! Indented rendering of the type hierarchy

use anyhow::Result;
use dcmis_core::{BaseType, TypeRegistry};
use std::collections::HashMap;

/// One line per type, indented by depth below the subtree root.
///
/// Without `root` every base type is rendered with its subtypes.
pub fn render(registry: &TypeRegistry, root: Option<&str>, depth: i32) -> Result<Vec<String>> {
    let roots: Vec<&str> = match root {
        Some(id) => vec![id],
        None => BaseType::ALL.iter().map(|b| b.id()).collect(),
    };

    let mut lines = Vec::new();
    for root in roots {
        let defs = registry.get_types(Some(root), depth, true)?;
        let mut levels: HashMap<&str, usize> = HashMap::new();
        for def in &defs {
            let level = def
                .parent_id
                .as_deref()
                .and_then(|p| levels.get(p))
                .map(|l| l + 1)
                .unwrap_or(0);
            levels.insert(def.id.as_str(), level);

            let mut flags = Vec::new();
            if def.creatable {
                flags.push("creatable");
            }
            if def.fileable {
                flags.push("fileable");
            }
            if def.versionable {
                flags.push("versionable");
            }
            if def.queryable {
                flags.push("queryable");
            }
            let own = def.property_definitions.iter().filter(|p| !p.inherited).count();
            lines.push(format!(
                "{}{} [{}] {} own properties, {} total",
                "  ".repeat(level),
                def.id,
                flags.join(","),
                own,
                def.property_definitions.len()
            ));
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcmis_core::{PropertyDefinition, PropertyType, RepositoryConfig, TypeDefinition};

    fn registry() -> TypeRegistry {
        let mut config = RepositoryConfig::default();
        config.types.push(
            TypeDefinition::subtype("acme:invoice", "cmis:document", BaseType::Document)
                .with_property(PropertyDefinition::new("acme:amount", PropertyType::Integer)),
        );
        config
            .types
            .push(TypeDefinition::subtype("acme:receipt", "acme:invoice", BaseType::Document));
        config.type_registry().unwrap()
    }

    #[test]
    fn test_render_indents_subtypes() {
        let lines = render(&registry(), Some("cmis:document"), -1).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cmis:document"));
        assert!(lines[1].starts_with("  acme:invoice"));
        assert!(lines[1].contains("1 own properties"));
        assert!(lines[2].starts_with("    acme:receipt"));
        assert!(lines[2].contains("0 own properties"));
    }

    #[test]
    fn test_render_all_base_types() {
        let lines = render(&registry(), None, 0).unwrap();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.starts_with("cmis:")));
    }

    #[test]
    fn test_render_unknown_type_fails() {
        assert!(render(&registry(), Some("acme:missing"), -1).is_err());
    }
}
