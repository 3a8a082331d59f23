use std::ffi::CString;

use ash::{prelude::VkResult, vk};
use cstr::cstr;

use super::{HasDevice, VulkanDeviceInfo, VulkanPoolDevice};

pub struct VulkanPipeline {
    device: VulkanPoolDevice,
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
}
impl VulkanPipeline {
    pub fn raw(&self) -> vk::Pipeline {
        self.pipeline
    }
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}
impl HasDevice for VulkanPipeline {
    fn device(&self) -> &VulkanPoolDevice {
        &self.device
    }
}
impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_pipeline(self.pipeline, None);
        }
    }
}

/// The durable pipeline library: a `VkPipelineCache`.
pub struct VulkanPipelineLibrary {
    device: VulkanPoolDevice,
    cache: vk::PipelineCache,
}
impl VulkanPipelineLibrary {
    pub(super) fn new(device: VulkanPoolDevice, initial_data: &[u8]) -> VkResult<Self> {
        let cache = unsafe {
            device.raw().create_pipeline_cache(
                &vk::PipelineCacheCreateInfo::default().initial_data(initial_data),
                None,
            )?
        };
        Ok(Self { device, cache })
    }
    pub fn raw(&self) -> vk::PipelineCache {
        self.cache
    }
    pub fn data(&self) -> VkResult<Vec<u8>> {
        unsafe { self.device.raw().get_pipeline_cache_data(self.cache) }
    }
}
impl HasDevice for VulkanPipelineLibrary {
    fn device(&self) -> &VulkanPoolDevice {
        &self.device
    }
}
impl Drop for VulkanPipelineLibrary {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_pipeline_cache(self.cache, None);
        }
    }
}

const CACHE_HEADER_SIZE: usize = 16 + vk::UUID_SIZE;

/// Checks a `VkPipelineCacheHeaderVersionOne` against the current device. Drivers ignore
/// mismatched blobs silently, so a mismatch is reported here to let the caller start empty.
pub(super) fn validate_cache_header(data: &[u8], info: &VulkanDeviceInfo) -> VkResult<()> {
    if data.len() < CACHE_HEADER_SIZE {
        return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
    }
    let read_u32 = |offset: usize| {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&data[offset..offset + 4]);
        u32::from_ne_bytes(bytes)
    };
    let header_size = read_u32(0);
    let header_version = read_u32(4);
    if (header_size as usize) < CACHE_HEADER_SIZE
        || header_version != vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32
    {
        return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
    }
    if read_u32(8) != info.vendor_id
        || read_u32(12) != info.device_id
        || data[16..CACHE_HEADER_SIZE] != info.pipeline_cache_uuid
    {
        return Err(vk::Result::ERROR_INCOMPATIBLE_DRIVER);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ShaderStageDesc {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: CString,
}
impl ShaderStageDesc {
    pub fn new(stage: vk::ShaderStageFlags, module: vk::ShaderModule) -> Self {
        Self {
            stage,
            module,
            entry_point: cstr!("main").to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputePipelineDesc {
    pub flags: vk::PipelineCreateFlags,
    pub shader: ShaderStageDesc,
    pub layout: vk::PipelineLayout,
}

/// Graphics pipeline state for dynamic rendering. Viewport and scissor are always dynamic.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub flags: vk::PipelineCreateFlags,
    pub stages: Vec<ShaderStageDesc>,
    pub layout: vk::PipelineLayout,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub color_formats: Vec<vk::Format>,
    /// Per color attachment. Missing entries write all channels without blending.
    pub color_blend: Vec<vk::PipelineColorBlendAttachmentState>,
    /// `UNDEFINED` for no depth attachment.
    pub depth_format: vk::Format,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
}
impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            flags: vk::PipelineCreateFlags::empty(),
            stages: Vec::new(),
            layout: vk::PipelineLayout::null(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            color_formats: Vec::new(),
            color_blend: Vec::new(),
            depth_format: vk::Format::UNDEFINED,
            depth_test: false,
            depth_write: false,
            depth_compare_op: vk::CompareOp::GREATER_OR_EQUAL,
        }
    }
}

fn first_pipeline(
    result: Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>,
) -> VkResult<vk::Pipeline> {
    let pipelines = result.map_err(|(_, err)| err)?;
    pipelines.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
}

pub(super) fn build_compute(
    device: &VulkanPoolDevice,
    desc: &ComputePipelineDesc,
    library: Option<&VulkanPipelineLibrary>,
) -> VkResult<VulkanPipeline> {
    let cache = library.map(VulkanPipelineLibrary::raw).unwrap_or_default();
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(desc.shader.module)
        .name(&desc.shader.entry_point);
    let info = vk::ComputePipelineCreateInfo::default()
        .flags(desc.flags)
        .stage(stage)
        .layout(desc.layout);
    let pipeline = first_pipeline(unsafe {
        device
            .raw()
            .create_compute_pipelines(cache, std::slice::from_ref(&info), None)
    })?;
    Ok(VulkanPipeline {
        device: device.clone(),
        pipeline,
        bind_point: vk::PipelineBindPoint::COMPUTE,
    })
}

pub(super) fn build_graphics(
    device: &VulkanPoolDevice,
    desc: &GraphicsPipelineDesc,
    library: Option<&VulkanPipelineLibrary>,
) -> VkResult<VulkanPipeline> {
    let cache = library.map(VulkanPipelineLibrary::raw).unwrap_or_default();
    let stages = desc
        .stages
        .iter()
        .map(|shader| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(shader.stage)
                .module(shader.module)
                .name(&shader.entry_point)
        })
        .collect::<Vec<_>>();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&desc.vertex_bindings)
        .vertex_attribute_descriptions(&desc.vertex_attributes);
    let input_assembly_state =
        vk::PipelineInputAssemblyStateCreateInfo::default().topology(desc.topology);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(desc.polygon_mode)
        .cull_mode(desc.cull_mode)
        .front_face(desc.front_face)
        .line_width(1.0);
    let multisample_state =
        vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(desc.samples);
    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test)
        .depth_write_enable(desc.depth_write)
        .depth_compare_op(desc.depth_compare_op);
    let blend_attachments = (0..desc.color_formats.len())
        .map(|i| {
            desc.color_blend.get(i).copied().unwrap_or(
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA),
            )
        })
        .collect::<Vec<_>>();
    let color_blend_state =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&desc.color_formats)
        .depth_attachment_format(desc.depth_format);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .flags(desc.flags)
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(desc.layout)
        .push_next(&mut rendering_info);
    let pipeline = first_pipeline(unsafe {
        device
            .raw()
            .create_graphics_pipelines(cache, std::slice::from_ref(&info), None)
    })?;
    Ok(VulkanPipeline {
        device: device.clone(),
        pipeline,
        bind_point: vk::PipelineBindPoint::GRAPHICS,
    })
}
