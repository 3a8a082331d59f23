use super::{BindingKind, CompiledBindingPlan};
use crate::{descriptor::TableAllocation, PoolError, Result, SlotHandle};

/// A resource to be bound at a layout slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingResource {
    Buffer { address: u64, offset: u64, range: u64 },
    TextureView(u64),
    Sampler(u64),
}

/// Where a [`BindingResource`] lands in a compiled plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingTarget {
    /// Bound as its own parameter. `address` already includes the buffer offset.
    Direct {
        parameter: u32,
        address: u64,
        range: u64,
        dynamic_index: Option<u32>,
    },
    ResourceTable { offset: u32 },
    SamplerTable { offset: u32 },
}

impl BindingTarget {
    /// The descriptor slot this target occupies within a draw's table allocation.
    /// Direct targets have none.
    pub fn table_slot(&self, tables: &TableAllocation) -> Option<SlotHandle> {
        match self {
            BindingTarget::Direct { .. } => None,
            BindingTarget::ResourceTable { offset } => tables.resources?.handle(*offset),
            BindingTarget::SamplerTable { offset } => tables.samplers?.handle(*offset),
        }
    }
}

impl CompiledBindingPlan {
    /// Resolves `resource` bound at `slot` (array element `element`) to its place in the plan.
    ///
    /// Combined image samplers resolve a texture view into the resource table and a
    /// sampler into the sampler table.
    pub fn resolve(&self, slot: u32, element: u32, resource: &BindingResource) -> Result<BindingTarget> {
        let Some(info) = self.slots.get(&slot) else {
            return Err(PoolError::Configuration(format!(
                "slot {} is not declared in the layout",
                slot
            )));
        };
        if element >= info.descriptor_count {
            return Err(PoolError::Configuration(format!(
                "slot {}: element {} out of bounds for array of {}",
                slot, element, info.descriptor_count
            )));
        }
        let mismatch = || {
            PoolError::Configuration(format!(
                "slot {}: cannot bind {:?} to {:?}",
                slot, resource, info.kind
            ))
        };
        match (info.kind, resource) {
            (
                BindingKind::UniformBuffer
                | BindingKind::DynamicUniformBuffer
                | BindingKind::DynamicStorageBuffer,
                BindingResource::Buffer {
                    address,
                    offset,
                    range,
                },
            ) => {
                let parameter = self.direct_index(slot).ok_or_else(mismatch)?;
                Ok(BindingTarget::Direct {
                    parameter,
                    address: address + offset,
                    range: *range,
                    dynamic_index: self.dynamic_index(slot),
                })
            }
            (
                BindingKind::SampledResource | BindingKind::StorageResource,
                BindingResource::Buffer { .. } | BindingResource::TextureView(_),
            )
            | (BindingKind::CombinedImageSampler, BindingResource::TextureView(_)) => {
                let offset = self.resource_table_offset(slot).ok_or_else(mismatch)?;
                Ok(BindingTarget::ResourceTable {
                    offset: offset + element,
                })
            }
            (
                BindingKind::Sampler | BindingKind::CombinedImageSampler,
                BindingResource::Sampler(_),
            ) => {
                let offset = self.sampler_table_offset(slot).ok_or_else(mismatch)?;
                Ok(BindingTarget::SamplerTable {
                    offset: offset + element,
                })
            }
            _ => Err(mismatch()),
        }
    }
}
