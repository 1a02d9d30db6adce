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

use std::sync::Arc;

use bitflags::bitflags;
use ember_common::Error;
use smol_str::SmolStr;

use crate::PsoDesc;

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const COLOR_TARGET = 1 << 1;
        const DEPTH_TARGET = 1 << 2;
        const STORAGE = 1 << 3;
        const COPY_SOURCE = 1 << 4;
        const COPY_DESTINATION = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const STORAGE = 1 << 0;
        const VERTEX = 1 << 1;
        const INDEX = 1 << 2;
        const UNIFORM = 1 << 3;
        const COPY_SOURCE = 1 << 4;
        const COPY_DESTINATION = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GfxFormat {
    Rgba8,
    Bgra8,
    Rgba16Float,
    R32Float,
    D24Stencil8,
    D32Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub dims: [u32; 2],
    pub format: GfxFormat,
    pub usage: TextureUsage,
    pub mips: u32,
}

impl TextureDesc {
    pub fn new(format: GfxFormat, dims: [u32; 2]) -> Self {
        Self {
            dims,
            format,
            usage: TextureUsage::SAMPLED,
            mips: 1,
        }
    }

    pub fn usage(mut self, usage: TextureUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn mips(mut self, mips: u32) -> Self {
        self.mips = mips;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDesc {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self { size, usage }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GfxQueueType {
    Graphics,
    Compute,
    Transfer,
}

/// Access a pass declares for a resource. The executor turns changes of
/// access into barriers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GfxAccess {
    /// Undefined contents; legal only before first use.
    #[default]
    None,
    TexureSample,
    RenderTarget,
    ImageStore,
    CopySource,
    CopyDestination,
    BufferRead,
    BufferWrite,
}

/// Image layout a barrier transitions to or from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageBarrierKind {
    Undefined,
    Sampling,
    RenderTarget,
    Storage,
    CopySource,
    CopyDestination,
}

pub fn access_to_barrier(access: GfxAccess) -> ImageBarrierKind {
    match access {
        GfxAccess::TexureSample => ImageBarrierKind::Sampling,
        GfxAccess::RenderTarget => ImageBarrierKind::RenderTarget,
        GfxAccess::ImageStore => ImageBarrierKind::Storage,
        GfxAccess::CopySource => ImageBarrierKind::CopySource,
        GfxAccess::CopyDestination => ImageBarrierKind::CopyDestination,
        _ => ImageBarrierKind::Undefined,
    }
}

/// GPU texture created by the driver. The id is unique per driver and is
/// what graphs deduplicate imports by.
#[derive(Debug)]
pub struct GfxTexture {
    pub id: u64,
    pub name: SmolStr,
    pub desc: TextureDesc,
}

pub type GfxTextureRef = Arc<GfxTexture>;

#[derive(Debug)]
pub struct GfxBuffer {
    pub id: u64,
    pub name: SmolStr,
    pub desc: BufferDesc,
}

pub type GfxBufferRef = Arc<GfxBuffer>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GfxPipeline {
    pub id: u64,
}

/// Recorded GPU commands. All recording happens on the gfx thread; the
/// driver asserts this.
pub trait GfxCmdList {
    fn barrier_image(&mut self, texture: &GfxTextureRef, src: ImageBarrierKind, dst: ImageBarrierKind);
    fn barrier_buffer(&mut self, buffer: &GfxBufferRef);
    fn begin_render_pass(&mut self, colors: &[GfxTextureRef], depth: Option<&GfxTextureRef>);
    fn end_render_pass(&mut self);
    fn begin_label(&mut self, label: &str);
    fn end_label(&mut self);
    fn bind_pipeline(&mut self, pipeline: GfxPipeline);
    fn bind_param_block(&mut self, space: i16, block: u64);
    fn draw(&mut self, vertices: u32, instances: u32);
    fn dispatch(&mut self, groups: [u32; 3]);
    fn copy_texture(&mut self, src: &GfxTextureRef, dst: &GfxTextureRef);
    fn update_buffer(&mut self, buffer: &GfxBufferRef, offset: u64, bytes: &[u8]);
}

/// The GPU backend consumed by the render-graph core.
pub trait GfxDriver: Send + Sync {
    fn acquire_cmd_list(&self, queue: GfxQueueType) -> Box<dyn GfxCmdList>;
    fn submit_cmd_list(&self, cmd_list: Box<dyn GfxCmdList>) -> Result<(), Error>;
    fn create_texture(&self, desc: TextureDesc, name: &str) -> GfxTextureRef;
    fn create_buffer(&self, desc: BufferDesc, name: &str) -> GfxBufferRef;
    fn create_pipeline(&self, desc: &PsoDesc) -> Result<GfxPipeline, Error>;
    fn frame_number(&self) -> u64;
}
