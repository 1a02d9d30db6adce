// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use ember_common::Error;
use smol_str::SmolStr;

use crate::{
    BufferDesc, GfxAccess, GfxBufferRef, GfxCmdList, GfxDriver, GfxQueueType, GfxTextureRef,
    RdgBuffer, RdgBufferKind, RdgPass, RdgPassContext, RdgPassFlags, RdgPassId, RdgPool,
    RdgResource, RdgResourceData, RdgResourceId, RdgTexture, ShaderManager, ShaderParamBlock,
    TextureDesc,
};

use crate::driver::access_to_barrier;

#[derive(Default)]
pub struct RdgCompileOptions {}

#[derive(Default)]
pub struct RdgExecuteOptions {}

struct RdgEvent {
    name: SmolStr,
    data: String,
}

impl RdgEvent {
    fn label(&self) -> String {
        if self.data.is_empty() {
            self.name.to_string()
        } else {
            format!("{}: {}", self.name, self.data)
        }
    }
}

#[derive(Default)]
struct RdgPassData {
    events_to_begin: Vec<usize>,
    events_to_end: usize,
}

/// Per-frame graph of GPU passes. Passes execute in declaration order; a
/// barrier is emitted whenever a pass requires a resource in an access
/// state different from its current one. An instance is built, executed
/// once on the gfx thread and discarded.
pub struct RdgGraph {
    driver: Arc<dyn GfxDriver>,
    shader_manager: Arc<ShaderManager>,
    pool: Arc<RdgPool>,
    resources: Vec<RdgResourceData>,
    passes: Vec<RdgPass>,
    passes_data: Vec<RdgPassData>,
    imported: HashMap<u64, RdgResourceId>,
    events: Vec<RdgEvent>,
    events_stack: Vec<usize>,
}

impl RdgGraph {
    pub fn new(
        pool: Arc<RdgPool>,
        driver: Arc<dyn GfxDriver>,
        shader_manager: Arc<ShaderManager>,
    ) -> Self {
        Self {
            driver,
            shader_manager,
            pool,
            resources: Vec::new(),
            passes: Vec::new(),
            passes_data: Vec::new(),
            imported: HashMap::new(),
            events: Vec::new(),
            events_stack: Vec::new(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn GfxDriver> {
        &self.driver
    }

    pub fn shader_manager(&self) -> &Arc<ShaderManager> {
        &self.shader_manager
    }

    pub fn num_passes(&self) -> usize {
        self.passes.len()
    }

    pub fn num_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn add_pass(&mut self, name: &str, flags: RdgPassFlags) -> &mut RdgPass {
        let id = RdgPassId(self.passes.len() as u32);
        self.passes.push(RdgPass::new(name, id, flags));
        self.passes_data.push(RdgPassData {
            events_to_begin: mem::take(&mut self.events_stack),
            events_to_end: 0,
        });
        self.passes.last_mut().unwrap()
    }

    pub fn add_compute_pass(&mut self, name: &str, flags: RdgPassFlags) -> &mut RdgPass {
        self.add_pass(name, flags | RdgPassFlags::COMPUTE)
    }

    pub fn add_graphics_pass(&mut self, name: &str, flags: RdgPassFlags) -> &mut RdgPass {
        self.add_pass(name, flags | RdgPassFlags::GRAPHICS)
    }

    pub fn add_material_pass(&mut self, name: &str, flags: RdgPassFlags) -> &mut RdgPass {
        self.add_pass(name, flags | RdgPassFlags::MATERIAL)
    }

    pub fn add_copy_pass(&mut self, name: &str, flags: RdgPassFlags) -> &mut RdgPass {
        self.add_pass(name, flags | RdgPassFlags::COPY)
    }

    /// Transient texture realized from the pool right before execution.
    pub fn create_texture(&mut self, desc: TextureDesc, name: &str) -> RdgResourceId {
        self.add_resource(
            name,
            RdgResource::Texture(RdgTexture {
                desc,
                texture: None,
                pooled: true,
            }),
            GfxAccess::None,
        )
    }

    /// Wrap an existing GPU texture. Importing the same texture again
    /// returns the id of the first import.
    pub fn import_texture(&mut self, texture: &GfxTextureRef) -> RdgResourceId {
        if let Some(id) = self.find_texture(texture) {
            return id;
        }
        let id = self.add_resource(
            texture.name.as_str(),
            RdgResource::Texture(RdgTexture {
                desc: texture.desc,
                texture: Some(texture.clone()),
                pooled: false,
            }),
            GfxAccess::TexureSample,
        );
        self.imported.insert(texture.id, id);
        id
    }

    pub fn find_texture(&self, texture: &GfxTextureRef) -> Option<RdgResourceId> {
        self.imported.get(&texture.id).copied()
    }

    /// Transient storage buffer realized from the pool.
    pub fn create_storage_buffer(&mut self, desc: BufferDesc, name: &str) -> RdgResourceId {
        self.add_resource(
            name,
            RdgResource::Buffer(RdgBuffer {
                kind: RdgBufferKind::Storage,
                desc,
                buffer: None,
                pooled: true,
            }),
            GfxAccess::None,
        )
    }

    pub fn import_storage_buffer(&mut self, buffer: &GfxBufferRef) -> RdgResourceId {
        self.import_buffer(buffer, RdgBufferKind::Storage)
    }

    pub fn import_vert_buffer(&mut self, buffer: &GfxBufferRef) -> RdgResourceId {
        self.import_buffer(buffer, RdgBufferKind::Vertex)
    }

    pub fn import_index_buffer(&mut self, buffer: &GfxBufferRef) -> RdgResourceId {
        self.import_buffer(buffer, RdgBufferKind::Index)
    }

    pub fn find_buffer(&self, buffer: &GfxBufferRef) -> Option<RdgResourceId> {
        self.imported.get(&buffer.id).copied()
    }

    /// Register a parameter block built by `factory` from the fresh
    /// resource id. The block is a graph resource like any other.
    pub fn create_param_block<F>(&mut self, factory: F) -> RdgResourceId
    where
        F: FnOnce(RdgResourceId) -> ShaderParamBlock,
    {
        let id = RdgResourceId(self.resources.len() as u32);
        let block = factory(id);
        let name = SmolStr::new(block.name());
        self.resources.push(RdgResourceData {
            name,
            resource: RdgResource::ParamBlock(block),
            src_access: GfxAccess::None,
        });
        id
    }

    /// Keep a CPU-side copy alive for upload callbacks recorded later.
    pub fn make_upload_data(&self, bytes: &[u8]) -> Arc<Vec<u8>> {
        Arc::new(bytes.to_vec())
    }

    /// Open a profiling scope; the next declared pass begins it. Scopes
    /// close via [`RdgGraph::pop_event`].
    pub fn push_event(&mut self, name: &str, data: &str) {
        let event_id = self.events.len();
        self.events.push(RdgEvent {
            name: SmolStr::new(name),
            data: data.to_owned(),
        });
        self.events_stack.push(event_id);
    }

    /// Close a profiling scope. With no scope left open, the last
    /// declared pass ends one more inherited scope.
    pub fn pop_event(&mut self) {
        if self.events_stack.pop().is_none() {
            debug_assert!(!self.passes_data.is_empty());
            if let Some(last) = self.passes_data.last_mut() {
                last.events_to_end += 1;
            }
        }
    }

    /// Placeholder for pass reordering and resource aliasing.
    pub fn compile(&mut self, _options: &RdgCompileOptions) -> Result<(), Error> {
        Ok(())
    }

    pub fn execute(&mut self, _options: &RdgExecuteOptions) -> Result<(), Error> {
        let mut states = self
            .resources
            .iter()
            .map(|data| data.src_access)
            .collect::<Vec<_>>();

        let mut cmd_list = self.driver.acquire_cmd_list(GfxQueueType::Graphics);

        let pool = self.pool.clone();
        for data in &mut self.resources {
            if !data.resource.is_pooled() || data.resource.is_realized() {
                continue;
            }
            match &mut data.resource {
                RdgResource::Texture(texture) => {
                    texture.texture = Some(pool.acquire_texture(&texture.desc, &data.name));
                }
                RdgResource::Buffer(buffer) => {
                    buffer.buffer = Some(pool.acquire_buffer(&buffer.desc, &data.name));
                }
                RdgResource::ParamBlock(_) => {}
            }
        }

        for pass_index in 0..self.passes.len() {
            self.execute_pass(pass_index, cmd_list.as_mut(), &mut states)?;
        }

        for data in &mut self.resources {
            if !data.resource.is_pooled() {
                continue;
            }
            match &mut data.resource {
                RdgResource::Texture(texture) => {
                    if let Some(gfx) = texture.texture.take() {
                        pool.release_texture(gfx);
                    }
                }
                RdgResource::Buffer(buffer) => {
                    if let Some(gfx) = buffer.buffer.take() {
                        pool.release_buffer(gfx);
                    }
                }
                RdgResource::ParamBlock(_) => {}
            }
        }

        self.driver.submit_cmd_list(cmd_list)
    }

    fn execute_pass(
        &mut self,
        pass_index: usize,
        cmd_list: &mut dyn GfxCmdList,
        states: &mut [GfxAccess],
    ) -> Result<(), Error> {
        let pass_resources = self.passes[pass_index].resources().to_vec();

        for (resource_id, access) in &pass_resources {
            let index = resource_id.0 as usize;
            match &mut self.resources[index].resource {
                RdgResource::ParamBlock(block) => {
                    block.pack()?;
                    block.validate()?;
                }
                resource => {
                    if states[index] != *access {
                        transition_resource(cmd_list, resource, states[index], *access)?;
                        states[index] = *access;
                    }
                }
            }
        }

        for event_id in &self.passes_data[pass_index].events_to_begin {
            cmd_list.begin_label(&self.events[*event_id].label());
        }

        let callback = self.passes[pass_index].take_callback();
        let pass = &self.passes[pass_index];
        cmd_list.begin_label(pass.name());

        let implicit_render_pass = pass.is_graphics() && !pass.is_manual();
        let mut context = RdgPassContext {
            cmd_list: &mut *cmd_list,
            driver: self.driver.as_ref(),
            shader_manager: self.shader_manager.as_ref(),
            resources: &self.resources,
            pass,
        };
        if implicit_render_pass {
            context.begin_render_pass()?;
        }
        if let Some(callback) = callback {
            callback(&mut context)?;
        }
        if implicit_render_pass {
            context.end_render_pass();
        }

        cmd_list.end_label();
        for _ in 0..self.passes_data[pass_index].events_to_end {
            cmd_list.end_label();
        }
        Ok(())
    }

    fn import_buffer(&mut self, buffer: &GfxBufferRef, kind: RdgBufferKind) -> RdgResourceId {
        if let Some(id) = self.find_buffer(buffer) {
            return id;
        }
        let id = self.add_resource(
            buffer.name.as_str(),
            RdgResource::Buffer(RdgBuffer {
                kind,
                desc: buffer.desc,
                buffer: Some(buffer.clone()),
                pooled: false,
            }),
            GfxAccess::BufferRead,
        );
        self.imported.insert(buffer.id, id);
        id
    }

    fn add_resource(
        &mut self,
        name: &str,
        resource: RdgResource,
        src_access: GfxAccess,
    ) -> RdgResourceId {
        let id = RdgResourceId(self.resources.len() as u32);
        self.resources.push(RdgResourceData {
            name: SmolStr::new(name),
            resource,
            src_access,
        });
        id
    }
}

fn transition_resource(
    cmd_list: &mut dyn GfxCmdList,
    resource: &RdgResource,
    src: GfxAccess,
    dst: GfxAccess,
) -> Result<(), Error> {
    match resource {
        RdgResource::Texture(texture) => {
            let gfx = texture.texture.as_ref().ok_or(Error::InvalidState)?;
            cmd_list.barrier_image(gfx, access_to_barrier(src), access_to_barrier(dst));
        }
        RdgResource::Buffer(buffer) => {
            let gfx = buffer.buffer.as_ref().ok_or(Error::InvalidState)?;
            cmd_list.barrier_buffer(gfx);
        }
        RdgResource::ParamBlock(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use ember_common::Error;
    use smol_str::SmolStr;

    use crate::test_driver::TestDriver;
    use crate::{
        BufferDesc, BufferUsage, GfxDriver, GfxFormat, ParamValue, RdgExecuteOptions, RdgPassFlags,
        RdgPool, ShaderManager, ShaderParamBlock, ShaderParamInfo, ShaderParamType,
        ShaderReflection, TextureDesc, TextureUsage,
    };

    use super::RdgGraph;

    struct Frame {
        driver: Arc<TestDriver>,
        pool: Arc<RdgPool>,
        shader_manager: Arc<ShaderManager>,
    }

    impl Frame {
        fn new() -> Self {
            let driver = TestDriver::new();
            Self {
                pool: Arc::new(RdgPool::new(driver.clone())),
                shader_manager: Arc::new(ShaderManager::default()),
                driver,
            }
        }

        fn graph(&self) -> RdgGraph {
            RdgGraph::new(
                self.pool.clone(),
                self.driver.clone(),
                self.shader_manager.clone(),
            )
        }
    }

    fn storage_desc() -> TextureDesc {
        TextureDesc::new(GfxFormat::Rgba16Float, [64, 64])
            .usage(TextureUsage::STORAGE | TextureUsage::SAMPLED)
    }

    #[test]
    fn barriers_follow_declared_accesses() {
        let frame = Frame::new();
        let mut graph = frame.graph();

        let target = graph.create_texture(storage_desc(), "R");
        graph
            .add_compute_pass("P1", RdgPassFlags::empty())
            .storage_image(target)
            .bind(|context| {
                context.cmd_list().dispatch([8, 8, 1]);
                Ok(())
            });
        graph
            .add_graphics_pass("P2", RdgPassFlags::empty())
            .sampling(target)
            .bind(|context| {
                context.cmd_list().draw(3, 1);
                Ok(())
            });
        // Sampling again must not emit another barrier.
        graph
            .add_graphics_pass("P3", RdgPassFlags::empty())
            .sampling(target)
            .bind(|context| {
                context.cmd_list().draw(3, 1);
                Ok(())
            });

        graph.execute(&RdgExecuteOptions::default()).unwrap();

        let commands = frame.driver.submitted();
        let position = |needle: &str| {
            commands
                .iter()
                .position(|command| command == needle)
                .unwrap_or_else(|| panic!("missing {:?} in {:#?}", needle, commands))
        };

        let first_barrier = position("barrier image:R Undefined->Storage");
        let first_pass = position("begin_label P1");
        let second_barrier = position("barrier image:R Storage->Sampling");
        let second_pass = position("begin_label P2");
        assert!(first_barrier < first_pass);
        assert!(first_pass < second_barrier);
        assert!(second_barrier < second_pass);
        assert_eq!(
            2,
            commands
                .iter()
                .filter(|command| command.starts_with("barrier"))
                .count()
        );
    }

    #[test]
    fn graphics_pass_wraps_render_pass() {
        let frame = Frame::new();
        let mut graph = frame.graph();

        let color = graph.create_texture(
            TextureDesc::new(GfxFormat::Rgba8, [32, 32])
                .usage(TextureUsage::COLOR_TARGET | TextureUsage::SAMPLED),
            "color",
        );
        graph
            .add_graphics_pass("forward", RdgPassFlags::empty())
            .render_target(color)
            .bind(|context| {
                context.cmd_list().draw(3, 1);
                Ok(())
            });

        graph.execute(&RdgExecuteOptions::default()).unwrap();

        let commands = frame.driver.submitted();
        assert!(commands.contains(&"begin_render_pass colors:[color] depth:none".to_owned()));
        assert!(commands.contains(&"end_render_pass".to_owned()));

        // A manual pass drives its own render pass.
        let mut graph = frame.graph();
        let color = graph.create_texture(
            TextureDesc::new(GfxFormat::Rgba8, [32, 32])
                .usage(TextureUsage::COLOR_TARGET | TextureUsage::SAMPLED),
            "color",
        );
        graph
            .add_graphics_pass("manual", RdgPassFlags::MANUAL)
            .render_target(color)
            .bind(|context| {
                context.cmd_list().draw(3, 1);
                Ok(())
            });
        graph.execute(&RdgExecuteOptions::default()).unwrap();
        assert!(!frame
            .driver
            .submitted()
            .iter()
            .skip(commands.len())
            .any(|command| command.starts_with("begin_render_pass")));
    }

    #[test]
    fn empty_graph_submits_no_commands() {
        let frame = Frame::new();
        let mut graph = frame.graph();
        graph.execute(&RdgExecuteOptions::default()).unwrap();
        assert!(frame.driver.submitted().is_empty());
    }

    #[test]
    fn failed_pass_aborts_the_frame() {
        let frame = Frame::new();
        let mut graph = frame.graph();
        graph
            .add_compute_pass("broken", RdgPassFlags::empty())
            .bind(|_| Err(Error::InvalidState));
        assert_eq!(
            Err(Error::InvalidState),
            graph.execute(&RdgExecuteOptions::default())
        );
        assert!(frame.driver.submitted().is_empty());
    }

    #[test]
    fn imports_deduplicate_by_gpu_object() {
        let frame = Frame::new();
        let texture = frame.driver.create_texture(storage_desc(), "shared");
        let buffer = frame
            .driver
            .create_buffer(BufferDesc::new(64, BufferUsage::STORAGE), "vertices");

        let mut graph = frame.graph();
        let first = graph.import_texture(&texture);
        let second = graph.import_texture(&texture);
        assert_eq!(first, second);
        assert_eq!(Some(first), graph.find_texture(&texture));

        let vert = graph.import_vert_buffer(&buffer);
        assert_eq!(vert, graph.import_vert_buffer(&buffer));

        // Ids are dense, assigned in registration order.
        assert_eq!(0, first.0);
        assert_eq!(1, vert.0);
        assert_eq!(2, graph.num_resources());
    }

    #[test]
    fn transients_return_to_the_pool() {
        let frame = Frame::new();
        {
            let mut graph = frame.graph();
            let target = graph.create_texture(storage_desc(), "R");
            graph
                .add_compute_pass("fill", RdgPassFlags::empty())
                .storage_image(target)
                .bind(|_| Ok(()));
            graph.execute(&RdgExecuteOptions::default()).unwrap();
        }
        assert_eq!(1, frame.driver.created_textures());

        let mut graph = frame.graph();
        let target = graph.create_texture(storage_desc(), "R");
        graph
            .add_compute_pass("fill", RdgPassFlags::empty())
            .storage_image(target)
            .bind(|_| Ok(()));
        graph.execute(&RdgExecuteOptions::default()).unwrap();
        assert_eq!(1, frame.driver.created_textures());
    }

    #[test]
    fn events_wrap_pass_ranges() {
        let frame = Frame::new();
        let mut graph = frame.graph();

        graph.push_event("frame", "main view");
        graph
            .add_compute_pass("P1", RdgPassFlags::empty())
            .bind(|_| Ok(()));
        graph
            .add_compute_pass("P2", RdgPassFlags::empty())
            .bind(|_| Ok(()));
        graph.pop_event();

        graph.execute(&RdgExecuteOptions::default()).unwrap();

        let commands = frame.driver.submitted();
        let begin_scope = commands
            .iter()
            .position(|command| command == "begin_label frame: main view")
            .unwrap();
        let begin_p1 = commands
            .iter()
            .position(|command| command == "begin_label P1")
            .unwrap();
        assert!(begin_scope < begin_p1);
        // One end per pass label plus one for the inherited scope.
        assert_eq!(
            3,
            commands
                .iter()
                .filter(|command| *command == "end_label")
                .count()
        );
    }

    #[test]
    fn param_blocks_pack_before_binding() {
        let frame = Frame::new();
        let shader = frame.shader_manager.register_shader(
            "present",
            ShaderReflection {
                params: vec![ShaderParamInfo {
                    name: SmolStr::new("exposure"),
                    ty: ShaderParamType::Float,
                    space: 0,
                    binding: 0,
                    offset: 0,
                    size: 4,
                }],
            },
        );

        let mut graph = frame.graph();
        let shader_for_block = shader.clone();
        let block = graph.create_param_block(move |_| {
            let mut block = ShaderParamBlock::new(shader_for_block, 0, "present.params");
            block
                .set_var_by_name("exposure", ParamValue::Float(1.5))
                .unwrap();
            block
        });
        graph
            .add_graphics_pass("present", RdgPassFlags::empty())
            .params(block)
            .bind(move |context| {
                context.bind_param_block(block)?;
                context.cmd_list().draw(3, 1);
                Ok(())
            });
        graph.execute(&RdgExecuteOptions::default()).unwrap();
        assert!(frame
            .driver
            .submitted()
            .iter()
            .any(|command| command.starts_with("bind_param_block space:0")));

        // A block with an unset parameter fails validation and the frame.
        let mut graph = frame.graph();
        let block = graph
            .create_param_block(move |_| ShaderParamBlock::new(shader.clone(), 0, "present.params"));
        graph
            .add_graphics_pass("present", RdgPassFlags::empty())
            .params(block)
            .bind(|_| Ok(()));
        assert_eq!(
            Err(Error::InvalidData),
            graph.execute(&RdgExecuteOptions::default())
        );
    }

    #[test]
    fn copy_pass_transitions_imported_buffer() {
        let frame = Frame::new();
        let buffer = frame
            .driver
            .create_buffer(BufferDesc::new(256, BufferUsage::STORAGE), "scratch");

        let mut graph = frame.graph();
        let upload = graph.make_upload_data(&[1, 2, 3, 4]);
        let target = graph.import_storage_buffer(&buffer);
        let buffer_in_pass = buffer.clone();
        graph
            .add_copy_pass("upload", RdgPassFlags::empty())
            .copy_destination(target)
            .bind(move |context| {
                context
                    .cmd_list()
                    .update_buffer(&buffer_in_pass, 0, upload.as_slice());
                Ok(())
            });
        graph.execute(&RdgExecuteOptions::default()).unwrap();

        let commands = frame.driver.submitted();
        assert!(commands.contains(&"barrier buffer:scratch".to_owned()));
        assert!(commands.contains(&"update buffer:scratch offset:0 size:4".to_owned()));
    }
}
