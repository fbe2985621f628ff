//! Markup-tree codec.
//!
//! The document version travels in the default namespace
//! (`http://cyclonedx.org/schema/bom/<version>`). Lists are wrapped in a
//! container element, e.g. `<components><component .../></components>`.

use crate::error::{Error, Result};
use crate::format::{Format, SpecVersion};
use crate::model::{
    Bom, Component, ComponentType, Composition, Dependency, ExternalReference, Metadata, Property,
    Service, Tool, Vulnerability, VulnerabilitySource,
};
use serde::{Deserialize, Serialize};

const NAMESPACE_PREFIX: &str = "http://cyclonedx.org/schema/bom/";
const DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

#[derive(Serialize, Deserialize)]
struct XmlBom {
    #[serde(rename = "@xmlns", default)]
    xmlns: String,
    #[serde(
        rename = "@serialNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    serial_number: Option<String>,
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<XmlMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    components: Option<XmlComponents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    services: Option<XmlServices>,
    #[serde(
        rename = "externalReferences",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    external_references: Option<XmlExternalReferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependencies: Option<XmlDependencies>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compositions: Option<XmlCompositions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<XmlProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vulnerabilities: Option<XmlVulnerabilities>,
}

#[derive(Serialize, Deserialize)]
struct XmlMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tools: Option<XmlTools>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    component: Option<XmlComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<XmlProperties>,
}

#[derive(Serialize, Deserialize)]
struct XmlTools {
    #[serde(rename = "tool", default)]
    items: Vec<XmlTool>,
}

#[derive(Serialize, Deserialize)]
struct XmlTool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(
        rename = "externalReferences",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    external_references: Option<XmlExternalReferences>,
}

#[derive(Serialize, Deserialize)]
struct XmlComponents {
    #[serde(rename = "component", default)]
    items: Vec<XmlComponent>,
}

#[derive(Serialize, Deserialize)]
struct XmlComponent {
    #[serde(rename = "@type")]
    component_type: String,
    #[serde(rename = "@bom-ref", default, skip_serializing_if = "Option::is_none")]
    bom_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    purl: Option<String>,
    #[serde(
        rename = "externalReferences",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    external_references: Option<XmlExternalReferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<XmlProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    components: Option<XmlComponents>,
}

#[derive(Serialize, Deserialize)]
struct XmlServices {
    #[serde(rename = "service", default)]
    items: Vec<XmlService>,
}

#[derive(Serialize, Deserialize)]
struct XmlService {
    #[serde(rename = "@bom-ref", default, skip_serializing_if = "Option::is_none")]
    bom_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct XmlExternalReferences {
    #[serde(rename = "reference", default)]
    items: Vec<XmlExternalReference>,
}

#[derive(Serialize, Deserialize)]
struct XmlExternalReference {
    #[serde(rename = "@type")]
    reference_type: String,
    url: String,
}

#[derive(Serialize, Deserialize)]
struct XmlDependencies {
    #[serde(rename = "dependency", default)]
    items: Vec<XmlDependency>,
}

#[derive(Serialize, Deserialize)]
struct XmlDependency {
    #[serde(rename = "@ref")]
    reference: String,
    #[serde(rename = "dependency", default, skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<XmlRef>,
}

/// An empty element carrying only a `ref` attribute.
#[derive(Serialize, Deserialize)]
struct XmlRef {
    #[serde(rename = "@ref")]
    reference: String,
}

#[derive(Serialize, Deserialize)]
struct XmlCompositions {
    #[serde(rename = "composition", default)]
    items: Vec<XmlComposition>,
}

#[derive(Serialize, Deserialize)]
struct XmlComposition {
    aggregate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assemblies: Option<XmlAssemblies>,
}

#[derive(Serialize, Deserialize)]
struct XmlAssemblies {
    #[serde(rename = "assembly", default)]
    items: Vec<XmlRef>,
}

#[derive(Serialize, Deserialize)]
struct XmlProperties {
    #[serde(rename = "property", default)]
    items: Vec<XmlProperty>,
}

#[derive(Serialize, Deserialize)]
struct XmlProperty {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Serialize, Deserialize)]
struct XmlVulnerabilities {
    #[serde(rename = "vulnerability", default)]
    items: Vec<XmlVulnerability>,
}

#[derive(Serialize, Deserialize)]
struct XmlVulnerability {
    #[serde(rename = "@bom-ref", default, skip_serializing_if = "Option::is_none")]
    bom_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<XmlVulnerabilitySource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct XmlVulnerabilitySource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

/// `None` for an empty list so the wrapper element is omitted.
fn wrap<T, W>(items: &[T], convert: impl Fn(&T) -> W) -> Option<Vec<W>> {
    if items.is_empty() {
        None
    } else {
        Some(items.iter().map(convert).collect())
    }
}

fn references_to_xml(refs: &[ExternalReference]) -> Option<XmlExternalReferences> {
    wrap(refs, |r| XmlExternalReference {
        reference_type: r.reference_type.clone(),
        url: r.url.clone(),
    })
    .map(|items| XmlExternalReferences { items })
}

fn properties_to_xml(props: &[Property]) -> Option<XmlProperties> {
    wrap(props, |p| XmlProperty {
        name: p.name.clone(),
        value: p.value.clone(),
    })
    .map(|items| XmlProperties { items })
}

fn components_to_xml(components: &[Component]) -> Option<XmlComponents> {
    wrap(components, component_to_xml).map(|items| XmlComponents { items })
}

fn component_to_xml(c: &Component) -> XmlComponent {
    XmlComponent {
        component_type: c.component_type.as_str().to_string(),
        bom_ref: c.bom_ref.clone(),
        group: c.group.clone(),
        name: c.name.clone(),
        version: c.version.clone(),
        description: c.description.clone(),
        purl: c.purl.clone(),
        external_references: references_to_xml(&c.external_references),
        properties: properties_to_xml(&c.properties),
        components: components_to_xml(&c.components),
    }
}

fn to_xml(bom: &Bom) -> XmlBom {
    XmlBom {
        xmlns: format!("{NAMESPACE_PREFIX}{}", bom.spec_version),
        serial_number: bom.serial_number.clone(),
        version: bom.version,
        metadata: bom.metadata.as_ref().map(|m| XmlMetadata {
            timestamp: m.timestamp.clone(),
            tools: wrap(&m.tools, |t| XmlTool {
                vendor: t.vendor.clone(),
                name: t.name.clone(),
                version: t.version.clone(),
                external_references: references_to_xml(&t.external_references),
            })
            .map(|items| XmlTools { items }),
            component: m.component.as_ref().map(component_to_xml),
            properties: properties_to_xml(&m.properties),
        }),
        components: components_to_xml(&bom.components),
        services: wrap(&bom.services, |s| XmlService {
            bom_ref: s.bom_ref.clone(),
            group: s.group.clone(),
            name: s.name.clone(),
            version: s.version.clone(),
            description: s.description.clone(),
        })
        .map(|items| XmlServices { items }),
        external_references: references_to_xml(&bom.external_references),
        dependencies: wrap(&bom.dependencies, |d| XmlDependency {
            reference: d.reference.clone(),
            depends_on: d
                .depends_on
                .iter()
                .map(|r| XmlRef {
                    reference: r.clone(),
                })
                .collect(),
        })
        .map(|items| XmlDependencies { items }),
        compositions: wrap(&bom.compositions, |c| XmlComposition {
            aggregate: c.aggregate.clone(),
            assemblies: wrap(&c.assemblies, |a| XmlRef {
                reference: a.clone(),
            })
            .map(|items| XmlAssemblies { items }),
        })
        .map(|items| XmlCompositions { items }),
        properties: properties_to_xml(&bom.properties),
        vulnerabilities: wrap(&bom.vulnerabilities, |v| XmlVulnerability {
            bom_ref: v.bom_ref.clone(),
            id: v.id.clone(),
            source: v.source.as_ref().map(|s| XmlVulnerabilitySource {
                name: s.name.clone(),
                url: s.url.clone(),
            }),
            description: v.description.clone(),
        })
        .map(|items| XmlVulnerabilities { items }),
    }
}

fn references_from_xml(refs: Option<XmlExternalReferences>) -> Vec<ExternalReference> {
    refs.map(|r| r.items)
        .unwrap_or_default()
        .into_iter()
        .map(|r| ExternalReference {
            reference_type: r.reference_type,
            url: r.url,
        })
        .collect()
}

fn properties_from_xml(props: Option<XmlProperties>) -> Vec<Property> {
    props
        .map(|p| p.items)
        .unwrap_or_default()
        .into_iter()
        .map(|p| Property {
            name: p.name,
            value: p.value,
        })
        .collect()
}

fn components_from_xml(components: Option<XmlComponents>) -> Result<Vec<Component>> {
    components
        .map(|c| c.items)
        .unwrap_or_default()
        .into_iter()
        .map(component_from_xml)
        .collect()
}

fn component_from_xml(c: XmlComponent) -> Result<Component> {
    let component_type = ComponentType::parse(&c.component_type).ok_or_else(|| {
        Error::decode(
            Format::Xml,
            format!("unknown component type {:?}", c.component_type),
        )
    })?;
    Ok(Component {
        component_type,
        bom_ref: c.bom_ref,
        group: c.group,
        name: c.name,
        version: c.version,
        description: c.description,
        purl: c.purl,
        external_references: references_from_xml(c.external_references),
        properties: properties_from_xml(c.properties),
        components: components_from_xml(c.components)?,
    })
}

fn from_xml(xml: XmlBom) -> Result<Bom> {
    let spec_version = xml
        .xmlns
        .strip_prefix(NAMESPACE_PREFIX)
        .and_then(|v| v.parse::<SpecVersion>().ok())
        .ok_or_else(|| {
            Error::decode(
                Format::Xml,
                format!("missing or unknown namespace {:?}", xml.xmlns),
            )
        })?;

    let metadata = match xml.metadata {
        Some(m) => Some(Metadata {
            timestamp: m.timestamp,
            tools: m
                .tools
                .map(|t| t.items)
                .unwrap_or_default()
                .into_iter()
                .map(|t| Tool {
                    vendor: t.vendor,
                    name: t.name,
                    version: t.version,
                    external_references: references_from_xml(t.external_references),
                })
                .collect(),
            component: m.component.map(component_from_xml).transpose()?,
            properties: properties_from_xml(m.properties),
        }),
        None => None,
    };

    Ok(Bom {
        spec_version,
        serial_number: xml.serial_number,
        version: xml.version,
        metadata,
        components: components_from_xml(xml.components)?,
        services: xml
            .services
            .map(|s| s.items)
            .unwrap_or_default()
            .into_iter()
            .map(|s| Service {
                bom_ref: s.bom_ref,
                group: s.group,
                name: s.name,
                version: s.version,
                description: s.description,
            })
            .collect(),
        external_references: references_from_xml(xml.external_references),
        dependencies: xml
            .dependencies
            .map(|d| d.items)
            .unwrap_or_default()
            .into_iter()
            .map(|d| Dependency {
                reference: d.reference,
                depends_on: d.depends_on.into_iter().map(|r| r.reference).collect(),
            })
            .collect(),
        compositions: xml
            .compositions
            .map(|c| c.items)
            .unwrap_or_default()
            .into_iter()
            .map(|c| Composition {
                aggregate: c.aggregate,
                assemblies: c
                    .assemblies
                    .map(|a| a.items)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|r| r.reference)
                    .collect(),
            })
            .collect(),
        properties: properties_from_xml(xml.properties),
        vulnerabilities: xml
            .vulnerabilities
            .map(|v| v.items)
            .unwrap_or_default()
            .into_iter()
            .map(|v| Vulnerability {
                bom_ref: v.bom_ref,
                id: v.id,
                source: v.source.map(|s| VulnerabilitySource {
                    name: s.name,
                    url: s.url,
                }),
                description: v.description,
            })
            .collect(),
    })
}

pub fn encode(bom: &Bom) -> Result<Vec<u8>> {
    let body = quick_xml::se::to_string_with_root("bom", &to_xml(bom))
        .map_err(|e| Error::encode(Format::Xml, e))?;
    let mut out = String::with_capacity(DECLARATION.len() + body.len());
    out.push_str(DECLARATION);
    out.push_str(&body);
    Ok(out.into_bytes())
}

pub fn decode(data: &[u8]) -> Result<Bom> {
    let text = std::str::from_utf8(data).map_err(|e| Error::decode(Format::Xml, e))?;
    let text = text.trim_start_matches('\u{feff}');
    let xml: XmlBom = quick_xml::de::from_str(text).map_err(|e| Error::decode(Format::Xml, e))?;
    from_xml(xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<bom xmlns="http://cyclonedx.org/schema/bom/1.2" serialNumber="urn:uuid:3e671687-395b-41f5-a30f-a58921a69b79" version="1">
  <metadata>
    <component type="application">
      <group>Acme</group>
      <name>Storefront</name>
      <version>1.0.0</version>
    </component>
  </metadata>
  <components>
    <component type="library" bom-ref="pkg:npm/left-pad@1.3.0">
      <name>left-pad</name>
      <version>1.3.0</version>
      <purl>pkg:npm/left-pad@1.3.0</purl>
    </component>
  </components>
  <dependencies>
    <dependency ref="pkg:npm/left-pad@1.3.0">
      <dependency ref="pkg:npm/other@1.0.0"/>
    </dependency>
  </dependencies>
</bom>"#;

    #[test]
    fn reads_version_from_namespace() {
        let bom = decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(bom.spec_version, SpecVersion::V1_2);
        assert_eq!(bom.version, Some(1));
        assert_eq!(
            bom.serial_number.as_deref(),
            Some("urn:uuid:3e671687-395b-41f5-a30f-a58921a69b79")
        );
        let component = bom.metadata_component().unwrap();
        assert_eq!(component.group.as_deref(), Some("Acme"));
        assert_eq!(component.name, "Storefront");
        assert_eq!(bom.components[0].purl.as_deref(), Some("pkg:npm/left-pad@1.3.0"));
        assert_eq!(bom.dependencies[0].depends_on, vec!["pkg:npm/other@1.0.0"]);
    }

    #[test]
    fn writes_declaration_and_namespace() {
        let bom = decode(SAMPLE.as_bytes()).unwrap();
        let text = String::from_utf8(encode(&bom).unwrap()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\""));
        assert!(text.contains("xmlns=\"http://cyclonedx.org/schema/bom/1.2\""));
        assert!(!text.contains("<services"));

        let again = decode(text.as_bytes()).unwrap();
        assert_eq!(again, bom);
    }

    #[test]
    fn property_text_survives() {
        let mut bom = Bom::new(SpecVersion::V1_3);
        bom.properties.push(Property::new("stage", "release"));
        let again = decode(&encode(&bom).unwrap()).unwrap();
        assert_eq!(again.properties, bom.properties);
    }

    #[test]
    fn rejects_unknown_namespace() {
        let text = SAMPLE.replace("bom/1.2", "bom/9.9");
        assert!(matches!(
            decode(text.as_bytes()),
            Err(Error::Decode { format: Format::Xml, .. })
        ));
    }

    #[test]
    fn rejects_unknown_component_type() {
        let text = SAMPLE.replace("type=\"library\"", "type=\"widget\"");
        assert!(decode(text.as_bytes()).is_err());
    }
}
