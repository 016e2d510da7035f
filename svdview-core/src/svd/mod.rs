//! SVD adapter: turns CMSIS-SVD XML into [`PeripheralDesc`]s.
//!
//! Arrays are expanded, clusters flattened into prefixed registers, and
//! `derivedFrom` peripherals inherit the registers of their base.

use crate::description::{Access, DescriptionParser, FieldDesc, PeripheralDesc, RegisterDesc};
use crate::error::ParseError;
use anyhow::{Context as _, Result};
use std::fs;
use std::path::Path;
use svd_parser as svd;
use svd_rs as rs;

/// Description parser for CMSIS-SVD.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvdParser;

impl SvdParser {
    pub const fn new() -> Self {
        Self
    }

    /// Read an SVD file from disk.
    pub fn load_svd<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(path).context("Failed to read SVD file")
    }

    /// Synchronous parse, used by the async trait method.
    pub fn parse_str(xml: &str) -> Result<Vec<PeripheralDesc>, ParseError> {
        let device = svd::parse(xml).map_err(|e| ParseError::Malformed(format!("{e:#}")))?;
        convert_device(&device)
    }
}

impl DescriptionParser for SvdParser {
    async fn parse(&self, raw: &str) -> Result<Vec<PeripheralDesc>, ParseError> {
        Self::parse_str(raw)
    }
}

/// Register properties inherited down the hierarchy.
#[derive(Debug, Clone, Copy, Default)]
struct Defaults {
    size: Option<u32>,
    access: Option<Access>,
    reset_value: Option<u64>,
}

impl Defaults {
    fn inherit(self, props: &rs::RegisterProperties) -> Self {
        Self {
            size: props.size.or(self.size),
            access: props.access.map(convert_access).or(self.access),
            reset_value: props.reset_value.or(self.reset_value),
        }
    }
}

const fn convert_access(access: rs::Access) -> Access {
    match access {
        rs::Access::ReadOnly => Access::ReadOnly,
        rs::Access::WriteOnly => Access::WriteOnly,
        rs::Access::ReadWrite => Access::ReadWrite,
        rs::Access::WriteOnce => Access::WriteOnce,
        rs::Access::ReadWriteOnce => Access::ReadWriteOnce,
    }
}

/// Instance names and offsets of a possibly-array element.
fn instances(name: &str, dim: Option<&rs::DimElement>) -> Vec<(String, u64)> {
    let Some(dim) = dim else {
        return vec![(name.to_string(), 0)];
    };
    let indices = dim
        .dim_index
        .clone()
        .unwrap_or_else(|| (0..dim.dim).map(|i| i.to_string()).collect());
    indices
        .iter()
        .zip(0u64..)
        .map(|(index, i)| (name.replace("%s", index), i * u64::from(dim.dim_increment)))
        .collect()
}

fn convert_device(device: &rs::Device) -> Result<Vec<PeripheralDesc>, ParseError> {
    let device_defaults = Defaults::default().inherit(&device.default_register_properties);

    let mut out: Vec<(PeripheralDesc, Option<String>)> = Vec::new();
    for peripheral in &device.peripherals {
        let (info, dim) = match peripheral {
            rs::MaybeArray::Single(info) => (info, None),
            rs::MaybeArray::Array(info, dim) => (info, Some(dim)),
        };
        let defaults = device_defaults.inherit(&info.default_register_properties);

        let mut registers = Vec::new();
        if let Some(children) = &info.registers {
            flatten(children, "", 0, defaults, &mut registers)
                .map_err(|e| in_peripheral(&info.name, e))?;
        }
        registers.sort_by_key(|r| r.address_offset);

        for (name, offset) in instances(&info.name, dim) {
            let base_address = info.base_address.checked_add(offset).ok_or_else(|| {
                ParseError::Unsupported(format!("{name}: base address out of range"))
            })?;
            out.push((
                PeripheralDesc {
                    name,
                    base_address,
                    description: info.description.clone(),
                    group_name: info.group_name.clone(),
                    registers: registers.clone(),
                },
                info.derived_from.clone(),
            ));
        }
    }

    resolve_derived(out)
}

fn in_peripheral(peripheral: &str, e: ParseError) -> ParseError {
    match e {
        ParseError::Unsupported(msg) => ParseError::Unsupported(format!("{peripheral}.{msg}")),
        other => other,
    }
}

/// `base + address_offset + instance` as a register offset, or an error naming `name`.
fn offset_of(
    base: u32,
    address_offset: u32,
    instance: u64,
    name: &str,
) -> Result<u32, ParseError> {
    u32::try_from(instance)
        .ok()
        .and_then(|instance| base.checked_add(address_offset)?.checked_add(instance))
        .ok_or_else(|| ParseError::Unsupported(format!("{name}: address offset out of range")))
}

fn flatten(
    children: &[rs::RegisterCluster],
    prefix: &str,
    base_offset: u32,
    defaults: Defaults,
    out: &mut Vec<RegisterDesc>,
) -> Result<(), ParseError> {
    for child in children {
        match child {
            rs::RegisterCluster::Register(register) => {
                let (info, dim) = match register {
                    rs::MaybeArray::Single(info) => (info, None),
                    rs::MaybeArray::Array(info, dim) => (info, Some(dim)),
                };
                let props = defaults.inherit(&info.properties);
                let size = props.size.unwrap_or(32);
                if size == 0 || size > 64 {
                    return Err(ParseError::Unsupported(format!(
                        "{prefix}{}: register size {size}",
                        info.name
                    )));
                }
                for (name, offset) in instances(&info.name, dim) {
                    let name = format!("{prefix}{name}");
                    let fields =
                        convert_fields(info, size, props.access.unwrap_or_default(), &name)?;
                    out.push(RegisterDesc {
                        address_offset: offset_of(base_offset, info.address_offset, offset, &name)?,
                        name,
                        description: info.description.clone(),
                        size,
                        access: props.access.unwrap_or_default(),
                        reset_value: props.reset_value,
                        fields,
                    });
                }
            }
            rs::RegisterCluster::Cluster(cluster) => {
                let (info, dim) = match cluster {
                    rs::MaybeArray::Single(info) => (info, None),
                    rs::MaybeArray::Array(info, dim) => (info, Some(dim)),
                };
                let cluster_defaults = defaults.inherit(&info.default_register_properties);
                for (name, offset) in instances(&info.name, dim) {
                    let name = format!("{prefix}{name}");
                    let cluster_offset =
                        offset_of(base_offset, info.address_offset, offset, &name)?;
                    flatten(
                        &info.children,
                        &format!("{name}."),
                        cluster_offset,
                        cluster_defaults,
                        out,
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Fields of `register`, each checked to lie inside its `size` bits.
fn convert_fields(
    register: &rs::RegisterInfo,
    size: u32,
    register_access: Access,
    register_name: &str,
) -> Result<Vec<FieldDesc>, ParseError> {
    let Some(fields) = &register.fields else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for field in fields {
        let (info, dim) = match field {
            rs::MaybeArray::Single(info) => (info, None),
            rs::MaybeArray::Array(info, dim) => (info, Some(dim)),
        };
        for (name, offset) in instances(&info.name, dim) {
            let bit_offset = u32::try_from(offset)
                .ok()
                .and_then(|offset| info.bit_offset().checked_add(offset));
            let bit_width = info.bit_width();
            let fits = |lsb: u32| lsb.checked_add(bit_width).is_some_and(|end| end <= size);
            let Some(bit_offset) = bit_offset.filter(|&lsb| bit_width > 0 && fits(lsb)) else {
                return Err(ParseError::Unsupported(format!(
                    "{register_name}.{name}: bits outside the {size}-bit register"
                )));
            };
            out.push(FieldDesc {
                name,
                description: info.description.clone(),
                bit_offset,
                bit_width,
                access: info.access.map_or(register_access, convert_access),
            });
        }
    }
    out.sort_by_key(|f| f.bit_offset);
    Ok(out)
}

fn resolve_derived(
    peripherals: Vec<(PeripheralDesc, Option<String>)>,
) -> Result<Vec<PeripheralDesc>, ParseError> {
    let bases: Vec<PeripheralDesc> = peripherals.iter().map(|(p, _)| p.clone()).collect();
    peripherals
        .into_iter()
        .map(|(mut p, derived_from)| {
            let Some(base_name) = derived_from else {
                return Ok(p);
            };
            let base = bases
                .iter()
                .find(|b| b.name == base_name)
                .ok_or_else(|| ParseError::UnknownBase {
                    peripheral: p.name.clone(),
                    base: base_name.clone(),
                })?;
            if p.registers.is_empty() {
                p.registers.clone_from(&base.registers);
            }
            if p.description.is_none() {
                p.description.clone_from(&base.description);
            }
            if p.group_name.is_none() {
                p.group_name.clone_from(&base.group_name);
            }
            Ok(p)
        })
        .collect()
}
