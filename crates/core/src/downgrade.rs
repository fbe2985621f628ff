//! Schema downgrade chain.
//!
//! Each step narrows a document by exactly one specification version. Steps
//! are pure and one-way: they only drop or rewrite data, so folding directly
//! from the latest version to an older one is the same as walking through
//! every intermediate version.

use crate::error::{Error, Result};
use crate::format::SpecVersion;
use crate::model::{Bom, Component, ComponentType};

/// Narrow `bom` to `target`.
///
/// A document already at `target` is returned unchanged. Asking for a newer
/// version than the document carries is an error since upgrades are never
/// performed.
pub fn downgrade(mut bom: Bom, target: SpecVersion) -> Result<Bom> {
    if target > bom.spec_version {
        return Err(Error::Downgrade {
            from: bom.spec_version,
            to: target,
        });
    }

    while bom.spec_version > target {
        bom = step_down(bom);
    }
    Ok(bom)
}

/// Apply the single step from the document's version to the one before it.
///
/// A document at the oldest version is returned unchanged.
pub fn step_down(mut bom: Bom) -> Bom {
    let Some(previous) = bom.spec_version.previous() else {
        return bom;
    };

    match bom.spec_version {
        SpecVersion::V1_4 => to_v1_3(&mut bom),
        SpecVersion::V1_3 => to_v1_2(&mut bom),
        SpecVersion::V1_2 => to_v1_1(&mut bom),
        SpecVersion::V1_1 => to_v1_0(&mut bom),
        SpecVersion::V1_0 => {}
    }
    bom.spec_version = previous;
    bom
}

fn to_v1_3(bom: &mut Bom) {
    bom.vulnerabilities.clear();
    if let Some(metadata) = bom.metadata.as_mut() {
        for tool in &mut metadata.tools {
            tool.external_references.clear();
        }
    }
}

fn to_v1_2(bom: &mut Bom) {
    bom.compositions.clear();
    bom.properties.clear();
    if let Some(metadata) = bom.metadata.as_mut() {
        metadata.properties.clear();
        if let Some(component) = metadata.component.as_mut() {
            visit_components(std::slice::from_mut(component), &mut |c: &mut Component| {
                c.properties.clear()
            });
        }
    }
    visit_components(&mut bom.components, &mut |c: &mut Component| c.properties.clear());
}

fn to_v1_1(bom: &mut Bom) {
    bom.metadata = None;
    bom.services.clear();
    bom.dependencies.clear();
    visit_components(&mut bom.components, &mut |c: &mut Component| {
        c.component_type = match c.component_type {
            ComponentType::Container => ComponentType::Application,
            ComponentType::Firmware => ComponentType::Device,
            other => other,
        };
    });
}

fn to_v1_0(bom: &mut Bom) {
    bom.serial_number = None;
    bom.external_references.clear();
    visit_components(&mut bom.components, &mut |c: &mut Component| {
        c.bom_ref = None;
        c.external_references.clear();
        if c.component_type == ComponentType::File {
            c.component_type = ComponentType::Library;
        }
    });
}

/// Depth-first visit of a component tree.
fn visit_components(components: &mut [Component], f: &mut impl FnMut(&mut Component)) {
    for component in components {
        f(component);
        visit_components(&mut component.components, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Composition, Dependency, ExternalReference, Metadata, Property, Service, Tool,
        Vulnerability,
    };

    fn full_bom() -> Bom {
        let mut nested = Component::new(ComponentType::Firmware, "blob");
        nested.properties.push(Property::new("k", "v"));
        nested.bom_ref = Some("blob".to_string());

        let mut top = Component::new(ComponentType::Container, "image");
        top.bom_ref = Some("image".to_string());
        top.external_references.push(ExternalReference {
            reference_type: "website".to_string(),
            url: "https://example.com".to_string(),
        });
        top.components.push(nested);

        let mut bom = Bom::new(SpecVersion::LATEST);
        bom.serial_number = Some("urn:uuid:3e671687-395b-41f5-a30f-a58921a69b79".to_string());
        bom.version = Some(1);
        bom.metadata = Some(Metadata {
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            tools: vec![Tool {
                name: Some("scanner".to_string()),
                external_references: vec![ExternalReference {
                    reference_type: "vcs".to_string(),
                    url: "https://example.com/scanner".to_string(),
                }],
                ..Tool::default()
            }],
            component: Some(Component::new(ComponentType::Application, "app")),
            properties: vec![Property::new("team", "core")],
        });
        bom.components.push(top);
        bom.components
            .push(Component::new(ComponentType::File, "readme.txt"));
        bom.services.push(Service {
            name: "api".to_string(),
            ..Service::default()
        });
        bom.dependencies.push(Dependency {
            reference: "image".to_string(),
            depends_on: vec!["blob".to_string()],
        });
        bom.compositions.push(Composition {
            aggregate: "complete".to_string(),
            assemblies: vec!["image".to_string()],
        });
        bom.properties.push(Property::new("build", "42"));
        bom.vulnerabilities.push(Vulnerability {
            id: Some("CVE-2024-0001".to_string()),
            ..Vulnerability::default()
        });
        bom
    }

    #[test]
    fn downgrade_to_same_version_is_identity() {
        let bom = full_bom();
        assert_eq!(downgrade(bom.clone(), SpecVersion::LATEST).unwrap(), bom);
    }

    #[test]
    fn upgrade_is_rejected() {
        let bom = Bom::new(SpecVersion::V1_2);
        assert!(matches!(
            downgrade(bom, SpecVersion::V1_4),
            Err(Error::Downgrade { .. })
        ));
    }

    #[test]
    fn v1_3_drops_vulnerabilities_and_tool_references() {
        let bom = downgrade(full_bom(), SpecVersion::V1_3).unwrap();
        assert_eq!(bom.spec_version, SpecVersion::V1_3);
        assert!(bom.vulnerabilities.is_empty());
        let metadata = bom.metadata.unwrap();
        assert!(metadata.tools[0].external_references.is_empty());
        assert_eq!(metadata.properties.len(), 1);
        assert_eq!(bom.compositions.len(), 1);
    }

    #[test]
    fn v1_2_drops_compositions_and_properties() {
        let bom = downgrade(full_bom(), SpecVersion::V1_2).unwrap();
        assert!(bom.compositions.is_empty());
        assert!(bom.properties.is_empty());
        assert!(bom.metadata.as_ref().unwrap().properties.is_empty());
        assert!(bom.components[0].components[0].properties.is_empty());
        assert_eq!(bom.services.len(), 1);
    }

    #[test]
    fn v1_1_drops_metadata_and_maps_component_types() {
        let bom = downgrade(full_bom(), SpecVersion::V1_1).unwrap();
        assert!(bom.metadata.is_none());
        assert!(bom.services.is_empty());
        assert!(bom.dependencies.is_empty());
        assert_eq!(bom.components[0].component_type, ComponentType::Application);
        assert_eq!(
            bom.components[0].components[0].component_type,
            ComponentType::Device
        );
        assert_eq!(bom.components[1].component_type, ComponentType::File);
        assert!(bom.serial_number.is_some());
    }

    #[test]
    fn v1_0_drops_identifiers_and_references() {
        let bom = downgrade(full_bom(), SpecVersion::V1_0).unwrap();
        assert_eq!(bom.spec_version, SpecVersion::V1_0);
        assert!(bom.serial_number.is_none());
        assert!(bom.components[0].bom_ref.is_none());
        assert!(bom.components[0].external_references.is_empty());
        assert!(bom.components[0].components[0].bom_ref.is_none());
        assert_eq!(bom.components[1].component_type, ComponentType::Library);
        assert_eq!(bom.version, Some(1));
    }

    #[test]
    fn direct_fold_equals_stepwise_fold() {
        for target in SpecVersion::ALL {
            let direct = downgrade(full_bom(), target).unwrap();

            let mut stepwise = full_bom();
            while stepwise.spec_version > target {
                let next = stepwise.spec_version.previous().unwrap();
                stepwise = downgrade(stepwise, next).unwrap();
            }
            assert_eq!(direct, stepwise, "mismatch at {target}");
        }
    }
}
