use std::collections::BTreeMap;

use ash::vk;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::{PoolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKind {
    UniformBuffer,
    SampledResource,
    StorageResource,
    Sampler,
    DynamicUniformBuffer,
    DynamicStorageBuffer,
    /// A texture and its sampler declared at one slot. Occupies both tables.
    CombinedImageSampler,
}

impl BindingKind {
    /// Kinds bound directly as per-draw parameters instead of through a table.
    pub fn is_direct(self) -> bool {
        matches!(
            self,
            BindingKind::UniformBuffer
                | BindingKind::DynamicUniformBuffer
                | BindingKind::DynamicStorageBuffer
        )
    }
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            BindingKind::DynamicUniformBuffer | BindingKind::DynamicStorageBuffer
        )
    }
    pub fn uses_resource_table(self) -> bool {
        matches!(
            self,
            BindingKind::SampledResource
                | BindingKind::StorageResource
                | BindingKind::CombinedImageSampler
        )
    }
    pub fn uses_sampler_table(self) -> bool {
        matches!(
            self,
            BindingKind::Sampler | BindingKind::CombinedImageSampler
        )
    }
    fn code(self) -> &'static str {
        match self {
            BindingKind::UniformBuffer => "ub",
            BindingKind::SampledResource => "sr",
            BindingKind::StorageResource => "st",
            BindingKind::Sampler => "sm",
            BindingKind::DynamicUniformBuffer => "dub",
            BindingKind::DynamicStorageBuffer => "dsb",
            BindingKind::CombinedImageSampler => "cis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingLayoutEntry {
    pub slot: u32,
    pub kind: BindingKind,
    pub visibility: vk::ShaderStageFlags,
    /// 0 and 1 both mean a single descriptor.
    pub array_count: u32,
    pub is_dynamic: bool,
}

impl BindingLayoutEntry {
    pub fn new(slot: u32, kind: BindingKind) -> Self {
        Self {
            slot,
            kind,
            visibility: vk::ShaderStageFlags::ALL,
            array_count: 1,
            is_dynamic: kind.is_dynamic(),
        }
    }
    pub fn visibility(mut self, visibility: vk::ShaderStageFlags) -> Self {
        self.visibility = visibility;
        self
    }
    pub fn array(mut self, array_count: u32) -> Self {
        self.array_count = array_count;
        self
    }
    pub fn dynamic(mut self) -> Self {
        self.is_dynamic = true;
        self
    }
    fn descriptor_count(&self) -> u32 {
        self.array_count.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// In bytes. Must be a non-zero multiple of 4.
    pub size: u32,
    pub visibility: vk::ShaderStageFlags,
}

/// Ordered binding entries with unique slot numbers, plus optional inline constants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayout {
    pub entries: Vec<BindingLayoutEntry>,
    pub push_constants: Option<PushConstantRange>,
}

impl DescriptorSetLayout {
    pub fn new(entries: impl IntoIterator<Item = BindingLayoutEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            push_constants: None,
        }
    }
    pub fn with_push_constants(mut self, size: u32, visibility: vk::ShaderStageFlags) -> Self {
        self.push_constants = Some(PushConstantRange { size, visibility });
        self
    }
}

/// One parameter of the native binding object, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootParameter {
    Direct {
        slot: u32,
        kind: BindingKind,
        visibility: vk::ShaderStageFlags,
    },
    ResourceTable {
        size: u32,
        visibility: vk::ShaderStageFlags,
    },
    SamplerTable {
        size: u32,
        visibility: vk::ShaderStageFlags,
    },
    Constants {
        size: u32,
        visibility: vk::ShaderStageFlags,
    },
}

impl RootParameter {
    fn signature(&self) -> String {
        match self {
            RootParameter::Direct {
                slot,
                kind,
                visibility,
            } => format!("d{}:{}:{:x}", slot, kind.code(), visibility.as_raw()),
            RootParameter::ResourceTable { size, visibility } => {
                format!("rt{}:{:x}", size, visibility.as_raw())
            }
            RootParameter::SamplerTable { size, visibility } => {
                format!("st{}:{:x}", size, visibility.as_raw())
            }
            RootParameter::Constants { size, visibility } => {
                format!("pc{}:{:x}", size, visibility.as_raw())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutLimits {
    pub max_parameters: u32,
    pub max_push_constant_bytes: u32,
}
impl Default for LayoutLimits {
    fn default() -> Self {
        Self {
            max_parameters: 16,
            max_push_constant_bytes: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotInfo {
    pub kind: BindingKind,
    pub descriptor_count: u32,
}

/// The concrete binding plan for a [`DescriptorSetLayout`]. Immutable once compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBindingPlan {
    parameters: SmallVec<[RootParameter; 8]>,
    pub(crate) slots: BTreeMap<u32, SlotInfo>,
    direct_indices: BTreeMap<u32, u32>,
    resource_table_offsets: BTreeMap<u32, u32>,
    sampler_table_offsets: BTreeMap<u32, u32>,
    dynamic_indices: BTreeMap<u32, u32>,
    resource_table_size: u32,
    sampler_table_size: u32,
    resource_table_parameter: Option<u32>,
    sampler_table_parameter: Option<u32>,
    push_constant_parameter: Option<u32>,
}

impl CompiledBindingPlan {
    pub fn parameters(&self) -> &[RootParameter] {
        &self.parameters
    }
    pub fn direct_index(&self, slot: u32) -> Option<u32> {
        self.direct_indices.get(&slot).copied()
    }
    pub fn resource_table_offset(&self, slot: u32) -> Option<u32> {
        self.resource_table_offsets.get(&slot).copied()
    }
    pub fn sampler_table_offset(&self, slot: u32) -> Option<u32> {
        self.sampler_table_offsets.get(&slot).copied()
    }
    pub fn dynamic_index(&self, slot: u32) -> Option<u32> {
        self.dynamic_indices.get(&slot).copied()
    }
    pub fn direct_indices(&self) -> &BTreeMap<u32, u32> {
        &self.direct_indices
    }
    pub fn resource_table_offsets(&self) -> &BTreeMap<u32, u32> {
        &self.resource_table_offsets
    }
    pub fn sampler_table_offsets(&self) -> &BTreeMap<u32, u32> {
        &self.sampler_table_offsets
    }
    pub fn dynamic_indices(&self) -> &BTreeMap<u32, u32> {
        &self.dynamic_indices
    }
    pub fn dynamic_count(&self) -> u32 {
        self.dynamic_indices.len() as u32
    }
    pub fn resource_table_size(&self) -> u32 {
        self.resource_table_size
    }
    pub fn sampler_table_size(&self) -> u32 {
        self.sampler_table_size
    }
    /// Parameter index of the resource table, if the plan has one.
    pub fn resource_table_parameter(&self) -> Option<u32> {
        self.resource_table_parameter
    }
    pub fn sampler_table_parameter(&self) -> Option<u32> {
        self.sampler_table_parameter
    }
    pub fn push_constant_parameter(&self) -> Option<u32> {
        self.push_constant_parameter
    }
    /// Canonical text form of the parameter list. Two plans produce the same native
    /// binding object iff their signatures are equal.
    pub fn signature(&self) -> String {
        self.parameters.iter().map(RootParameter::signature).join(";")
    }
}

/// Compiles declarative binding layouts into [`CompiledBindingPlan`]s.
#[derive(Debug, Clone, Default)]
pub struct BindingLayoutCompiler {
    limits: LayoutLimits,
}

impl BindingLayoutCompiler {
    pub fn new(limits: LayoutLimits) -> Self {
        Self { limits }
    }
    pub fn limits(&self) -> &LayoutLimits {
        &self.limits
    }

    pub fn compile_entries(&self, entries: &[BindingLayoutEntry]) -> Result<CompiledBindingPlan> {
        self.compile(&DescriptorSetLayout::new(entries.iter().copied()))
    }

    /// Single pass over the entries in declaration order.
    ///
    /// Direct-bound kinds take the next direct index (and the next dynamic index when
    /// dynamic); table kinds take the running offset of their table, which advances by
    /// `max(1, array_count)`. Tables and constants are appended after the direct parameters.
    pub fn compile(&self, layout: &DescriptorSetLayout) -> Result<CompiledBindingPlan> {
        let mut parameters: SmallVec<[RootParameter; 8]> = SmallVec::new();
        let mut slots = BTreeMap::new();
        let mut direct_indices = BTreeMap::new();
        let mut resource_table_offsets = BTreeMap::new();
        let mut sampler_table_offsets = BTreeMap::new();
        let mut dynamic_indices = BTreeMap::new();
        let mut resource_counter = 0u32;
        let mut sampler_counter = 0u32;
        let mut resource_visibility = vk::ShaderStageFlags::empty();
        let mut sampler_visibility = vk::ShaderStageFlags::empty();

        for entry in layout.entries.iter() {
            let info = SlotInfo {
                kind: entry.kind,
                descriptor_count: entry.descriptor_count(),
            };
            if slots.insert(entry.slot, info).is_some() {
                return Err(PoolError::Configuration(format!(
                    "slot {} declared more than once",
                    entry.slot
                )));
            }
            if entry.kind.is_direct() {
                if entry.descriptor_count() > 1 {
                    return Err(PoolError::Configuration(format!(
                        "slot {}: {:?} cannot be an array",
                        entry.slot, entry.kind
                    )));
                }
                direct_indices.insert(entry.slot, parameters.len() as u32);
                parameters.push(RootParameter::Direct {
                    slot: entry.slot,
                    kind: entry.kind,
                    visibility: entry.visibility,
                });
                if entry.is_dynamic {
                    dynamic_indices.insert(entry.slot, dynamic_indices.len() as u32);
                }
            } else if entry.is_dynamic {
                tracing::warn!(
                    slot = entry.slot,
                    kind = ?entry.kind,
                    "dynamic flag ignored on a table bound slot"
                );
            }
            if entry.kind.uses_resource_table() {
                resource_table_offsets.insert(entry.slot, resource_counter);
                resource_counter = checked_advance(resource_counter, entry)?;
                resource_visibility |= entry.visibility;
            }
            if entry.kind.uses_sampler_table() {
                sampler_table_offsets.insert(entry.slot, sampler_counter);
                sampler_counter = checked_advance(sampler_counter, entry)?;
                sampler_visibility |= entry.visibility;
            }
        }

        let mut resource_table_parameter = None;
        if resource_counter > 0 {
            resource_table_parameter = Some(parameters.len() as u32);
            parameters.push(RootParameter::ResourceTable {
                size: resource_counter,
                visibility: resource_visibility,
            });
        }
        let mut sampler_table_parameter = None;
        if sampler_counter > 0 {
            sampler_table_parameter = Some(parameters.len() as u32);
            parameters.push(RootParameter::SamplerTable {
                size: sampler_counter,
                visibility: sampler_visibility,
            });
        }
        let mut push_constant_parameter = None;
        if let Some(push_constants) = layout.push_constants {
            if push_constants.size == 0 || push_constants.size % 4 != 0 {
                return Err(PoolError::Configuration(format!(
                    "push constant size {} is not a non-zero multiple of 4",
                    push_constants.size
                )));
            }
            if push_constants.size > self.limits.max_push_constant_bytes {
                return Err(PoolError::Configuration(format!(
                    "push constants use {} bytes, limit is {}",
                    push_constants.size, self.limits.max_push_constant_bytes
                )));
            }
            push_constant_parameter = Some(parameters.len() as u32);
            parameters.push(RootParameter::Constants {
                size: push_constants.size,
                visibility: push_constants.visibility,
            });
        }

        if parameters.len() as u32 > self.limits.max_parameters {
            return Err(PoolError::Configuration(format!(
                "binding layout needs {} parameters, backend limit is {}",
                parameters.len(),
                self.limits.max_parameters
            )));
        }

        let plan = CompiledBindingPlan {
            parameters,
            slots,
            direct_indices,
            resource_table_offsets,
            sampler_table_offsets,
            dynamic_indices,
            resource_table_size: resource_counter,
            sampler_table_size: sampler_counter,
            resource_table_parameter,
            sampler_table_parameter,
            push_constant_parameter,
        };
        tracing::debug!(signature = %plan.signature(), "binding layout compiled");
        Ok(plan)
    }
}

fn checked_advance(counter: u32, entry: &BindingLayoutEntry) -> Result<u32> {
    counter.checked_add(entry.descriptor_count()).ok_or_else(|| {
        PoolError::Configuration(format!("slot {}: descriptor table too large", entry.slot))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler() -> BindingLayoutCompiler {
        BindingLayoutCompiler::default()
    }

    #[test]
    fn test_mixed_layout() {
        let plan = compiler()
            .compile_entries(&[
                BindingLayoutEntry::new(0, BindingKind::UniformBuffer),
                BindingLayoutEntry::new(1, BindingKind::SampledResource),
                BindingLayoutEntry::new(2, BindingKind::SampledResource).array(4),
                BindingLayoutEntry::new(3, BindingKind::Sampler),
            ])
            .unwrap();
        assert_eq!(plan.direct_index(0), Some(0));
        assert_eq!(plan.resource_table_offset(1), Some(0));
        assert_eq!(plan.resource_table_offset(2), Some(1));
        assert_eq!(plan.sampler_table_offset(3), Some(0));
        assert_eq!(plan.resource_table_size(), 5);
        assert_eq!(plan.sampler_table_size(), 1);

        let tables: Vec<_> = plan
            .parameters()
            .iter()
            .filter(|p| !matches!(p, RootParameter::Direct { .. }))
            .collect();
        assert_eq!(
            tables,
            [
                &RootParameter::ResourceTable {
                    size: 5,
                    visibility: vk::ShaderStageFlags::ALL
                },
                &RootParameter::SamplerTable {
                    size: 1,
                    visibility: vk::ShaderStageFlags::ALL
                },
            ]
        );
        assert_eq!(plan.resource_table_parameter(), Some(1));
        assert_eq!(plan.sampler_table_parameter(), Some(2));
    }

    #[test]
    fn test_combined_image_sampler_advances_both_tables() {
        let plan = compiler()
            .compile_entries(&[
                BindingLayoutEntry::new(0, BindingKind::StorageResource),
                BindingLayoutEntry::new(1, BindingKind::CombinedImageSampler).array(2),
                BindingLayoutEntry::new(2, BindingKind::Sampler),
            ])
            .unwrap();
        assert_eq!(plan.resource_table_offset(1), Some(1));
        assert_eq!(plan.sampler_table_offset(1), Some(0));
        assert_eq!(plan.sampler_table_offset(2), Some(2));
        assert_eq!(plan.resource_table_size(), 3);
        assert_eq!(plan.sampler_table_size(), 3);
        assert_eq!(plan.parameters().len(), 2);
    }

    #[test]
    fn test_dynamic_indices() {
        let plan = compiler()
            .compile(
                &DescriptorSetLayout::new([
                    BindingLayoutEntry::new(4, BindingKind::UniformBuffer),
                    BindingLayoutEntry::new(2, BindingKind::DynamicUniformBuffer),
                    BindingLayoutEntry::new(7, BindingKind::UniformBuffer).dynamic(),
                    BindingLayoutEntry::new(9, BindingKind::DynamicStorageBuffer)
                        .visibility(vk::ShaderStageFlags::COMPUTE),
                ])
                .with_push_constants(16, vk::ShaderStageFlags::VERTEX),
            )
            .unwrap();
        assert_eq!(plan.direct_index(4), Some(0));
        assert_eq!(plan.direct_index(2), Some(1));
        assert_eq!(plan.direct_index(9), Some(3));
        assert_eq!(plan.dynamic_index(4), None);
        assert_eq!(plan.dynamic_index(2), Some(0));
        assert_eq!(plan.dynamic_index(7), Some(1));
        assert_eq!(plan.dynamic_index(9), Some(2));
        assert_eq!(plan.dynamic_count(), 3);
        assert_eq!(plan.push_constant_parameter(), Some(4));
        assert_eq!(
            plan.signature(),
            "d4:ub:7fffffff;d2:dub:7fffffff;d7:ub:7fffffff;d9:dsb:20;pc16:1"
        );
    }

    #[test]
    fn test_table_visibility_is_union() {
        let plan = compiler()
            .compile_entries(&[
                BindingLayoutEntry::new(0, BindingKind::SampledResource)
                    .visibility(vk::ShaderStageFlags::VERTEX),
                BindingLayoutEntry::new(1, BindingKind::StorageResource)
                    .visibility(vk::ShaderStageFlags::FRAGMENT),
            ])
            .unwrap();
        assert_eq!(
            plan.parameters(),
            &[RootParameter::ResourceTable {
                size: 2,
                visibility: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
            }]
        );
    }

    #[test]
    fn test_deterministic() {
        let entries = [
            BindingLayoutEntry::new(3, BindingKind::Sampler),
            BindingLayoutEntry::new(0, BindingKind::DynamicUniformBuffer),
            BindingLayoutEntry::new(1, BindingKind::CombinedImageSampler).array(3),
            BindingLayoutEntry::new(5, BindingKind::StorageResource),
        ];
        let a = compiler().compile_entries(&entries).unwrap();
        let b = compiler().compile_entries(&entries).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(
            a.resource_table_offsets()
                .iter()
                .collect::<Vec<_>>(),
            b.resource_table_offsets().iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_configuration_errors() {
        let duplicate = compiler().compile_entries(&[
            BindingLayoutEntry::new(0, BindingKind::Sampler),
            BindingLayoutEntry::new(0, BindingKind::SampledResource),
        ]);
        assert!(matches!(duplicate, Err(PoolError::Configuration(_))));

        let arrayed_uniform = compiler()
            .compile_entries(&[BindingLayoutEntry::new(0, BindingKind::UniformBuffer).array(2)]);
        assert!(matches!(arrayed_uniform, Err(PoolError::Configuration(_))));

        let too_many = BindingLayoutCompiler::new(LayoutLimits {
            max_parameters: 2,
            ..Default::default()
        })
        .compile_entries(&[
            BindingLayoutEntry::new(0, BindingKind::UniformBuffer),
            BindingLayoutEntry::new(1, BindingKind::UniformBuffer),
            BindingLayoutEntry::new(2, BindingKind::SampledResource),
        ]);
        assert!(matches!(too_many, Err(PoolError::Configuration(_))));

        let odd_constants = compiler()
            .compile(&DescriptorSetLayout::default().with_push_constants(6, vk::ShaderStageFlags::ALL));
        assert!(matches!(odd_constants, Err(PoolError::Configuration(_))));
        let big_constants = compiler()
            .compile(&DescriptorSetLayout::default().with_push_constants(256, vk::ShaderStageFlags::ALL));
        assert!(matches!(big_constants, Err(PoolError::Configuration(_))));
    }

    #[test]
    fn test_dynamic_flag_ignored_on_table_kinds() {
        let plan = compiler()
            .compile_entries(&[
                BindingLayoutEntry::new(0, BindingKind::SampledResource).dynamic(),
                BindingLayoutEntry::new(1, BindingKind::Sampler).dynamic(),
                BindingLayoutEntry::new(2, BindingKind::UniformBuffer).dynamic(),
            ])
            .unwrap();
        assert_eq!(plan.resource_table_offset(0), Some(0));
        assert_eq!(plan.sampler_table_offset(1), Some(0));
        assert_eq!(plan.dynamic_index(0), None);
        assert_eq!(plan.dynamic_index(1), None);
        assert_eq!(plan.dynamic_index(2), Some(0));
        assert_eq!(plan.dynamic_count(), 1);
    }

    #[test]
    fn test_empty_layout() {
        let plan = compiler().compile(&DescriptorSetLayout::default()).unwrap();
        assert!(plan.parameters().is_empty());
        assert_eq!(plan.signature(), "");
    }
}
