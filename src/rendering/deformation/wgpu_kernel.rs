use std::sync::Arc;

use anyhow::anyhow;
use bytemuck::{Pod, Zeroable};
use log::{debug, trace};
use wgpu::util::DeviceExt;

use crate::rendering::deformation::DeformationError;
use crate::rendering::deformation::kernel::{DeformationKernel, validate_dispatch};
use crate::rendering::deformation::packing::{DeformationInputs, DeformedVertex, JointPaletteEntry};
use crate::util::weak_cache::WeakKeyCache;

const WORKGROUP_SIZE: u32 = 64;

const BASE_VERTICES_IDX: u32 = 0;
const BLEND_DELTAS_IDX: u32 = 1;
const FRAME_WEIGHTS_IDX: u32 = 2;
const INFLUENCES_IDX: u32 = 3;
const PALETTE_IDX: u32 = 4;
const DEFORMED_IDX: u32 = 5;
const PARAMS_IDX: u32 = 6;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DispatchParams {
    vertex_count: u32,
    influences_per_vertex: u32,
    frame_count: u32,
    joint_count: u32,
}

/// The per mesh buffers, uploaded once per [`DeformationInputs`] (i.e. once per mesh version).
struct GpuInputs {
    base_vertices: wgpu::Buffer,
    blend_deltas: wgpu::Buffer,
    influences: wgpu::Buffer,
}

/// Runs the deformation as compute shader and reads the result back.
pub struct WgpuDeformationKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    blend_pipeline: wgpu::ComputePipeline,
    blend_skin_pipeline: wgpu::ComputePipeline,
    inputs: WeakKeyCache<DeformationInputs, Arc<GpuInputs>>,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl WgpuDeformationKernel {
    pub async fn new() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("No wgpu adapter available"))?;

        debug!("Deforming on {:?}", adapter.get_info());
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Deformation Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Self::from_device(device, queue))
    }

    pub fn new_blocking() -> anyhow::Result<Self> {
        pollster::block_on(Self::new())
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Deformation Bind Group Layout"),
            entries: &[
                storage_entry(BASE_VERTICES_IDX, true),
                storage_entry(BLEND_DELTAS_IDX, true),
                storage_entry(FRAME_WEIGHTS_IDX, true),
                storage_entry(INFLUENCES_IDX, true),
                storage_entry(PALETTE_IDX, true),
                storage_entry(DEFORMED_IDX, false),
                wgpu::BindGroupLayoutEntry {
                    binding: PARAMS_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Deformation Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::include_wgsl!(
            "../../../shaders/src/deformation/deform.wgsl"
        ));

        let blend_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Deformation: Blend"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("blend_main"),
            compilation_options: Default::default(),
            cache: None,
        });
        let blend_skin_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Deformation: Blend + Skin"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("blend_skin_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            device,
            queue,
            bind_group_layout,
            blend_pipeline,
            blend_skin_pipeline,
            inputs: WeakKeyCache::new(),
        }
    }

    /// Storage bindings can't be empty, so empty contents still get a single zero word.
    fn storage_buffer(&self, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        let padding = [0u8; 4];
        let contents = if contents.is_empty() { &padding[..] } else { contents };
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE | usage,
            })
    }

    fn gpu_inputs(&self, inputs: &Arc<DeformationInputs>) -> Arc<GpuInputs> {
        self.inputs.get_or_insert_with(inputs, |inputs| {
            trace!("Uploading deformation inputs {:?}", inputs);
            Arc::new(GpuInputs {
                base_vertices: self.storage_buffer(
                    "Base Vertices",
                    bytemuck::cast_slice(&inputs.base_vertices),
                    wgpu::BufferUsages::empty(),
                ),
                blend_deltas: self.storage_buffer(
                    "Blend Deltas",
                    bytemuck::cast_slice(&inputs.blend_deltas),
                    wgpu::BufferUsages::empty(),
                ),
                influences: self.storage_buffer(
                    "Joint Influences",
                    bytemuck::cast_slice(&inputs.influences),
                    wgpu::BufferUsages::empty(),
                ),
            })
        })
    }

    fn read_back(&self, staging: &wgpu::Buffer) -> Result<Vec<DeformedVertex>, DeformationError> {
        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver)
            .map_err(|_| DeformationError::Backend("The readback has been cancelled".to_string()))?
            .map_err(|err| DeformationError::Backend(err.to_string()))?;

        let deformed = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, DeformedVertex>(&data).to_vec()
        };
        staging.unmap();
        Ok(deformed)
    }
}

impl DeformationKernel for WgpuDeformationKernel {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn deform(
        &self,
        inputs: &Arc<DeformationInputs>,
        frame_weights: &[f32],
        palette: Option<&[JointPaletteEntry]>,
    ) -> Result<Vec<DeformedVertex>, DeformationError> {
        profiling::scope!("WgpuDeformationKernel::deform");
        validate_dispatch(inputs, frame_weights, palette)?;
        if inputs.vertex_count == 0 {
            return Ok(vec![]);
        }

        let gpu_inputs = self.gpu_inputs(inputs);
        let skinned = palette.is_some() && inputs.is_skinned();
        let palette = palette.unwrap_or_default();

        let params = DispatchParams {
            vertex_count: inputs.vertex_count as u32,
            influences_per_vertex: inputs.influences_per_vertex as u32,
            frame_count: inputs.frame_count as u32,
            joint_count: palette.len() as u32,
        };
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Deformation Params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let frame_weights_buffer = self.storage_buffer(
            "Frame Weights",
            bytemuck::cast_slice(frame_weights),
            wgpu::BufferUsages::empty(),
        );
        let palette_buffer = self.storage_buffer(
            "Joint Palette",
            bytemuck::cast_slice(palette),
            wgpu::BufferUsages::empty(),
        );

        let output_size = (inputs.vertex_count * size_of::<DeformedVertex>()) as u64;
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Deformed Vertices"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Deformed Vertices Readback"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Deformation Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BASE_VERTICES_IDX,
                    resource: gpu_inputs.base_vertices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BLEND_DELTAS_IDX,
                    resource: gpu_inputs.blend_deltas.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: FRAME_WEIGHTS_IDX,
                    resource: frame_weights_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: INFLUENCES_IDX,
                    resource: gpu_inputs.influences.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: PALETTE_IDX,
                    resource: palette_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: DEFORMED_IDX,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: PARAMS_IDX,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Deformation Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Deformation Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(if skinned {
                &self.blend_skin_pipeline
            } else {
                &self.blend_pipeline
            });
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups((inputs.vertex_count as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&output, 0, &staging, 0, output_size);
        self.queue.submit(Some(encoder.finish()));

        self.read_back(&staging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::asset_graph::mesh_asset::MeshContents;
    use crate::rendering::deformation::cpu_kernel::CpuDeformationKernel;
    use crate::rendering::deformation::skinning::compose_joint_palette;
    use crate::rendering::importer::mesh_importer::MeshImporter;
    use glam::{Affine3A, Mat4, Vec3, Vec4};
    use meshsync_authoring::mesh::{
        RawBlendShape, RawBlendShapeFrame, RawBoneWeight, RawIndices, RawMesh, RawSubMesh, Topology,
    };

    fn skinned_triangle() -> MeshContents {
        let raw = RawMesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            tangents: vec![Vec4::new(1.0, 0.0, 0.0, 1.0); 3],
            indices: RawIndices::U16(vec![0, 1, 2]),
            sub_meshes: vec![RawSubMesh {
                index_start: 0,
                index_count: 3,
                base_vertex: 0,
                topology: Topology::Triangles,
            }],
            bones_per_vertex: vec![1, 1, 2],
            bone_weights: vec![
                RawBoneWeight {
                    joint_index: 0,
                    weight: 1.0,
                },
                RawBoneWeight {
                    joint_index: 1,
                    weight: 1.0,
                },
                RawBoneWeight {
                    joint_index: 0,
                    weight: 0.5,
                },
                RawBoneWeight {
                    joint_index: 1,
                    weight: 0.5,
                },
            ],
            bind_poses: vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0))],
            joint_parents: vec![None, Some(0)],
            blend_shapes: vec![RawBlendShape {
                name: "bulge".to_string(),
                frames: vec![RawBlendShapeFrame {
                    weight: 1.0,
                    delta_positions: vec![Vec3::ZERO, Vec3::ZERO, Vec3::Z],
                    delta_normals: vec![Vec3::X * 0.1; 3],
                    ..Default::default()
                }],
            }],
            ..Default::default()
        };

        MeshImporter::import(&raw).expect("valid mesh")
    }

    #[test]
    pub fn matches_the_cpu_kernel() {
        let Ok(gpu) = WgpuDeformationKernel::new_blocking() else {
            // no adapter on this machine
            return;
        };

        let contents = skinned_triangle();
        let inputs = Arc::new(DeformationInputs::build(&contents).expect("packable"));
        let skeleton = inputs.skeleton.clone().expect("skinned");
        let palette = compose_joint_palette(
            &skeleton,
            &[
                Affine3A::from_rotation_y(0.5),
                Affine3A::from_translation(Vec3::new(1.0, 0.5, 0.0)),
            ],
        );

        for palette in [None, Some(palette.as_slice())] {
            let expected = CpuDeformationKernel
                .deform(&inputs, &[0.75], palette)
                .expect("cpu deformation");
            let actual = gpu.deform(&inputs, &[0.75], palette).expect("gpu deformation");

            assert_eq!(actual.len(), expected.len());
            for (actual, expected) in actual.iter().zip(&expected) {
                let actual: &[f32] = bytemuck::cast_slice(std::slice::from_ref(actual));
                let expected: &[f32] = bytemuck::cast_slice(std::slice::from_ref(expected));
                for (a, e) in actual.iter().zip(expected) {
                    assert!((a - e).abs() < 1e-4, "{:?} != {:?}", actual, expected);
                }
            }
        }
    }
}
