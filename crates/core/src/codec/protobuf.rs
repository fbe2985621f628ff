//! Compact binary codec.
//!
//! Messages are declared with `prost` derives rather than generated from a
//! `.proto` file so the crate builds without `protoc`.

use crate::error::{Error, Result};
use crate::format::{Format, SpecVersion};
use crate::model::{
    Bom, Component, ComponentType, Composition, Dependency, ExternalReference, Metadata, Property,
    Service, Tool, Vulnerability, VulnerabilitySource,
};
use prost::Message;

mod wire {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Bom {
        #[prost(string, tag = "1")]
        pub spec_version: String,
        #[prost(uint32, optional, tag = "2")]
        pub version: Option<u32>,
        #[prost(string, optional, tag = "3")]
        pub serial_number: Option<String>,
        #[prost(message, optional, tag = "4")]
        pub metadata: Option<Metadata>,
        #[prost(message, repeated, tag = "5")]
        pub components: Vec<Component>,
        #[prost(message, repeated, tag = "6")]
        pub services: Vec<Service>,
        #[prost(message, repeated, tag = "7")]
        pub external_references: Vec<ExternalReference>,
        #[prost(message, repeated, tag = "8")]
        pub dependencies: Vec<Dependency>,
        #[prost(message, repeated, tag = "9")]
        pub compositions: Vec<Composition>,
        #[prost(message, repeated, tag = "10")]
        pub vulnerabilities: Vec<Vulnerability>,
        #[prost(message, repeated, tag = "11")]
        pub properties: Vec<Property>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Classification {
        Null = 0,
        Application = 1,
        Framework = 2,
        Library = 3,
        OperatingSystem = 4,
        Device = 5,
        File = 6,
        Container = 7,
        Firmware = 8,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Component {
        #[prost(enumeration = "Classification", tag = "1")]
        pub r#type: i32,
        #[prost(string, optional, tag = "3")]
        pub bom_ref: Option<String>,
        #[prost(string, optional, tag = "7")]
        pub group: Option<String>,
        #[prost(string, tag = "8")]
        pub name: String,
        #[prost(string, optional, tag = "9")]
        pub version: Option<String>,
        #[prost(string, optional, tag = "10")]
        pub description: Option<String>,
        #[prost(string, optional, tag = "16")]
        pub purl: Option<String>,
        #[prost(message, repeated, tag = "20")]
        pub external_references: Vec<ExternalReference>,
        #[prost(message, repeated, tag = "21")]
        pub components: Vec<Component>,
        #[prost(message, repeated, tag = "22")]
        pub properties: Vec<Property>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Metadata {
        #[prost(string, optional, tag = "1")]
        pub timestamp: Option<String>,
        #[prost(message, repeated, tag = "2")]
        pub tools: Vec<Tool>,
        #[prost(message, optional, tag = "4")]
        pub component: Option<Component>,
        #[prost(message, repeated, tag = "8")]
        pub properties: Vec<Property>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Tool {
        #[prost(string, optional, tag = "1")]
        pub vendor: Option<String>,
        #[prost(string, optional, tag = "2")]
        pub name: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub version: Option<String>,
        #[prost(message, repeated, tag = "5")]
        pub external_references: Vec<ExternalReference>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Service {
        #[prost(string, optional, tag = "1")]
        pub bom_ref: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub group: Option<String>,
        #[prost(string, tag = "4")]
        pub name: String,
        #[prost(string, optional, tag = "5")]
        pub version: Option<String>,
        #[prost(string, optional, tag = "6")]
        pub description: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ExternalReference {
        #[prost(string, tag = "1")]
        pub r#type: String,
        #[prost(string, tag = "2")]
        pub url: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Dependency {
        #[prost(string, tag = "1")]
        pub r#ref: String,
        #[prost(message, repeated, tag = "2")]
        pub dependencies: Vec<Dependency>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Composition {
        #[prost(string, tag = "1")]
        pub aggregate: String,
        #[prost(string, repeated, tag = "2")]
        pub assemblies: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Property {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, optional, tag = "2")]
        pub value: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Vulnerability {
        #[prost(string, optional, tag = "1")]
        pub bom_ref: Option<String>,
        #[prost(string, optional, tag = "2")]
        pub id: Option<String>,
        #[prost(message, optional, tag = "3")]
        pub source: Option<Source>,
        #[prost(string, optional, tag = "6")]
        pub description: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Source {
        #[prost(string, optional, tag = "1")]
        pub name: Option<String>,
        #[prost(string, optional, tag = "2")]
        pub url: Option<String>,
    }
}

use wire::Classification;

fn classification(t: ComponentType) -> Classification {
    match t {
        ComponentType::Application => Classification::Application,
        ComponentType::Framework => Classification::Framework,
        ComponentType::Library => Classification::Library,
        ComponentType::Container => Classification::Container,
        ComponentType::OperatingSystem => Classification::OperatingSystem,
        ComponentType::Device => Classification::Device,
        ComponentType::Firmware => Classification::Firmware,
        ComponentType::File => Classification::File,
    }
}

fn component_type(raw: i32) -> Result<ComponentType> {
    let classification = Classification::try_from(raw).map_err(|_| {
        Error::decode(Format::Protobuf, format!("unknown component type {raw}"))
    })?;
    Ok(match classification {
        Classification::Application => ComponentType::Application,
        Classification::Framework => ComponentType::Framework,
        Classification::Library => ComponentType::Library,
        Classification::Container => ComponentType::Container,
        Classification::OperatingSystem => ComponentType::OperatingSystem,
        Classification::Device => ComponentType::Device,
        Classification::Firmware => ComponentType::Firmware,
        Classification::File => ComponentType::File,
        Classification::Null => {
            return Err(Error::decode(
                Format::Protobuf,
                "component type is unset",
            ));
        }
    })
}

fn reference_to_wire(r: &ExternalReference) -> wire::ExternalReference {
    wire::ExternalReference {
        r#type: r.reference_type.clone(),
        url: r.url.clone(),
    }
}

fn reference_from_wire(r: wire::ExternalReference) -> ExternalReference {
    ExternalReference {
        reference_type: r.r#type,
        url: r.url,
    }
}

fn property_to_wire(p: &Property) -> wire::Property {
    wire::Property {
        name: p.name.clone(),
        value: Some(p.value.clone()),
    }
}

fn property_from_wire(p: wire::Property) -> Property {
    Property {
        name: p.name,
        value: p.value.unwrap_or_default(),
    }
}

fn component_to_wire(c: &Component) -> wire::Component {
    wire::Component {
        r#type: classification(c.component_type) as i32,
        bom_ref: c.bom_ref.clone(),
        group: c.group.clone(),
        name: c.name.clone(),
        version: c.version.clone(),
        description: c.description.clone(),
        purl: c.purl.clone(),
        external_references: c.external_references.iter().map(reference_to_wire).collect(),
        components: c.components.iter().map(component_to_wire).collect(),
        properties: c.properties.iter().map(property_to_wire).collect(),
    }
}

fn component_from_wire(c: wire::Component) -> Result<Component> {
    Ok(Component {
        component_type: component_type(c.r#type)?,
        bom_ref: c.bom_ref,
        group: c.group,
        name: c.name,
        version: c.version,
        description: c.description,
        purl: c.purl,
        external_references: c
            .external_references
            .into_iter()
            .map(reference_from_wire)
            .collect(),
        properties: c.properties.into_iter().map(property_from_wire).collect(),
        components: c
            .components
            .into_iter()
            .map(component_from_wire)
            .collect::<Result<_>>()?,
    })
}

fn to_wire(bom: &Bom) -> wire::Bom {
    wire::Bom {
        spec_version: bom.spec_version.to_string(),
        version: bom.version,
        serial_number: bom.serial_number.clone(),
        metadata: bom.metadata.as_ref().map(|m| wire::Metadata {
            timestamp: m.timestamp.clone(),
            tools: m
                .tools
                .iter()
                .map(|t| wire::Tool {
                    vendor: t.vendor.clone(),
                    name: t.name.clone(),
                    version: t.version.clone(),
                    external_references: t
                        .external_references
                        .iter()
                        .map(reference_to_wire)
                        .collect(),
                })
                .collect(),
            component: m.component.as_ref().map(component_to_wire),
            properties: m.properties.iter().map(property_to_wire).collect(),
        }),
        components: bom.components.iter().map(component_to_wire).collect(),
        services: bom
            .services
            .iter()
            .map(|s| wire::Service {
                bom_ref: s.bom_ref.clone(),
                group: s.group.clone(),
                name: s.name.clone(),
                version: s.version.clone(),
                description: s.description.clone(),
            })
            .collect(),
        external_references: bom
            .external_references
            .iter()
            .map(reference_to_wire)
            .collect(),
        dependencies: bom
            .dependencies
            .iter()
            .map(|d| wire::Dependency {
                r#ref: d.reference.clone(),
                dependencies: d
                    .depends_on
                    .iter()
                    .map(|r| wire::Dependency {
                        r#ref: r.clone(),
                        dependencies: Vec::new(),
                    })
                    .collect(),
            })
            .collect(),
        compositions: bom
            .compositions
            .iter()
            .map(|c| wire::Composition {
                aggregate: c.aggregate.clone(),
                assemblies: c.assemblies.clone(),
            })
            .collect(),
        vulnerabilities: bom
            .vulnerabilities
            .iter()
            .map(|v| wire::Vulnerability {
                bom_ref: v.bom_ref.clone(),
                id: v.id.clone(),
                source: v.source.as_ref().map(|s| wire::Source {
                    name: s.name.clone(),
                    url: s.url.clone(),
                }),
                description: v.description.clone(),
            })
            .collect(),
        properties: bom.properties.iter().map(property_to_wire).collect(),
    }
}

fn from_wire(bom: wire::Bom) -> Result<Bom> {
    let spec_version: SpecVersion = bom
        .spec_version
        .parse()
        .map_err(|e| Error::decode(Format::Protobuf, e))?;

    let metadata = match bom.metadata {
        Some(m) => Some(Metadata {
            timestamp: m.timestamp,
            tools: m
                .tools
                .into_iter()
                .map(|t| Tool {
                    vendor: t.vendor,
                    name: t.name,
                    version: t.version,
                    external_references: t
                        .external_references
                        .into_iter()
                        .map(reference_from_wire)
                        .collect(),
                })
                .collect(),
            component: m.component.map(component_from_wire).transpose()?,
            properties: m.properties.into_iter().map(property_from_wire).collect(),
        }),
        None => None,
    };

    Ok(Bom {
        spec_version,
        serial_number: bom.serial_number,
        version: bom.version,
        metadata,
        components: bom
            .components
            .into_iter()
            .map(component_from_wire)
            .collect::<Result<_>>()?,
        services: bom
            .services
            .into_iter()
            .map(|s| Service {
                bom_ref: s.bom_ref,
                group: s.group,
                name: s.name,
                version: s.version,
                description: s.description,
            })
            .collect(),
        external_references: bom
            .external_references
            .into_iter()
            .map(reference_from_wire)
            .collect(),
        dependencies: bom
            .dependencies
            .into_iter()
            .map(|d| Dependency {
                reference: d.r#ref,
                depends_on: d.dependencies.into_iter().map(|r| r.r#ref).collect(),
            })
            .collect(),
        compositions: bom
            .compositions
            .into_iter()
            .map(|c| Composition {
                aggregate: c.aggregate,
                assemblies: c.assemblies,
            })
            .collect(),
        properties: bom.properties.into_iter().map(property_from_wire).collect(),
        vulnerabilities: bom
            .vulnerabilities
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
    Ok(to_wire(bom).encode_to_vec())
}

pub fn decode(data: &[u8]) -> Result<Bom> {
    let message = wire::Bom::decode(data).map_err(|e| Error::decode(Format::Protobuf, e))?;
    from_wire(message)
}
