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

use bitflags::bitflags;
use ember_common::Error;
use smol_str::SmolStr;

use crate::{
    GfxAccess, GfxBufferRef, GfxCmdList, GfxDriver, GfxTextureRef, RdgPassId, RdgResourceData,
    RdgResourceId, ShaderManager,
};

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RdgPassFlags: u32 {
        const COMPUTE = 1 << 0;
        const GRAPHICS = 1 << 1;
        const MATERIAL = 1 << 2;
        const COPY = 1 << 3;
        /// The callback drives its own render-pass begin/end.
        const MANUAL = 1 << 4;
    }
}

pub type RdgPassCallback = Box<dyn FnOnce(&mut RdgPassContext) -> Result<(), Error>>;

/// One unit of GPU work with its declared resource accesses. Dependencies
/// between passes are implicit in the accesses they declare.
pub struct RdgPass {
    name: SmolStr,
    id: RdgPassId,
    flags: RdgPassFlags,
    resources: Vec<(RdgResourceId, GfxAccess)>,
    color_targets: Vec<RdgResourceId>,
    depth_target: Option<RdgResourceId>,
    callback: Option<RdgPassCallback>,
}

impl RdgPass {
    pub(crate) fn new(name: &str, id: RdgPassId, flags: RdgPassFlags) -> Self {
        Self {
            name: SmolStr::new(name),
            id,
            flags,
            resources: Vec::new(),
            color_targets: Vec::new(),
            depth_target: None,
            callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> RdgPassId {
        self.id
    }

    pub fn flags(&self) -> RdgPassFlags {
        self.flags
    }

    pub fn is_graphics(&self) -> bool {
        self.flags
            .intersects(RdgPassFlags::GRAPHICS | RdgPassFlags::MATERIAL)
    }

    pub fn is_manual(&self) -> bool {
        self.flags.contains(RdgPassFlags::MANUAL)
    }

    pub fn resources(&self) -> &[(RdgResourceId, GfxAccess)] {
        &self.resources
    }

    pub fn color_targets(&self) -> &[RdgResourceId] {
        &self.color_targets
    }

    pub fn depth_target(&self) -> Option<RdgResourceId> {
        self.depth_target
    }

    pub fn sampling(&mut self, texture: RdgResourceId) -> &mut Self {
        self.access(texture, GfxAccess::TexureSample)
    }

    pub fn render_target(&mut self, texture: RdgResourceId) -> &mut Self {
        self.color_targets.push(texture);
        self.access(texture, GfxAccess::RenderTarget)
    }

    pub fn depth_stencil_target(&mut self, texture: RdgResourceId) -> &mut Self {
        self.depth_target = Some(texture);
        self.access(texture, GfxAccess::RenderTarget)
    }

    pub fn storage_image(&mut self, texture: RdgResourceId) -> &mut Self {
        self.access(texture, GfxAccess::ImageStore)
    }

    pub fn copy_source(&mut self, resource: RdgResourceId) -> &mut Self {
        self.access(resource, GfxAccess::CopySource)
    }

    pub fn copy_destination(&mut self, resource: RdgResourceId) -> &mut Self {
        self.access(resource, GfxAccess::CopyDestination)
    }

    pub fn reading(&mut self, buffer: RdgResourceId) -> &mut Self {
        self.access(buffer, GfxAccess::BufferRead)
    }

    pub fn writing(&mut self, buffer: RdgResourceId) -> &mut Self {
        self.access(buffer, GfxAccess::BufferWrite)
    }

    /// Attach a parameter block; it is packed and validated right before
    /// this pass executes.
    pub fn params(&mut self, block: RdgResourceId) -> &mut Self {
        self.access(block, GfxAccess::None)
    }

    pub fn bind<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut RdgPassContext) -> Result<(), Error> + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub(crate) fn take_callback(&mut self) -> Option<RdgPassCallback> {
        self.callback.take()
    }

    fn access(&mut self, resource: RdgResourceId, access: GfxAccess) -> &mut Self {
        self.resources.push((resource, access));
        self
    }
}

/// Execution-time view handed to a pass callback.
pub struct RdgPassContext<'a> {
    pub(crate) cmd_list: &'a mut dyn GfxCmdList,
    pub(crate) driver: &'a dyn GfxDriver,
    pub(crate) shader_manager: &'a ShaderManager,
    pub(crate) resources: &'a [RdgResourceData],
    pub(crate) pass: &'a RdgPass,
}

impl<'a> RdgPassContext<'a> {
    pub fn cmd_list(&mut self) -> &mut dyn GfxCmdList {
        &mut *self.cmd_list
    }

    pub fn driver(&self) -> &dyn GfxDriver {
        self.driver
    }

    pub fn shader_manager(&self) -> &ShaderManager {
        self.shader_manager
    }

    pub fn pass(&self) -> &RdgPass {
        self.pass
    }

    pub fn texture(&self, resource: RdgResourceId) -> Result<&GfxTextureRef, Error> {
        self.resources
            .get(resource.0 as usize)
            .and_then(|data| data.resource.texture())
            .ok_or(Error::InvalidState)
    }

    pub fn buffer(&self, resource: RdgResourceId) -> Result<&GfxBufferRef, Error> {
        self.resources
            .get(resource.0 as usize)
            .and_then(|data| data.resource.buffer())
            .ok_or(Error::InvalidState)
    }

    /// Bind a packed parameter block at its declared space index.
    pub fn bind_param_block(&mut self, resource: RdgResourceId) -> Result<(), Error> {
        let block = self
            .resources
            .get(resource.0 as usize)
            .and_then(|data| data.resource.param_block())
            .ok_or(Error::InvalidState)?;
        self.cmd_list
            .bind_param_block(block.space(), block.get_param_block());
        Ok(())
    }

    pub fn begin_render_pass(&mut self) -> Result<(), Error> {
        let mut colors = Vec::with_capacity(self.pass.color_targets().len());
        for target in self.pass.color_targets() {
            colors.push(self.texture(*target)?.clone());
        }
        let depth = match self.pass.depth_target() {
            Some(target) => Some(self.texture(target)?.clone()),
            None => None,
        };
        self.cmd_list.begin_render_pass(&colors, depth.as_ref());
        Ok(())
    }

    pub fn end_render_pass(&mut self) {
        self.cmd_list.end_render_pass();
    }
}
