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

use smol_str::SmolStr;

use crate::{BufferDesc, GfxAccess, GfxBufferRef, GfxTextureRef, ShaderParamBlock, TextureDesc};

/// Dense per-graph resource id, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RdgResourceId(pub u32);

/// Dense per-graph pass id, assigned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RdgPassId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdgBufferKind {
    Storage,
    Vertex,
    Index,
}

/// Texture node of the graph. Transients carry only a descriptor until the
/// executor realizes them from the pool; imports are realized on creation.
pub struct RdgTexture {
    pub desc: TextureDesc,
    pub texture: Option<GfxTextureRef>,
    pub pooled: bool,
}

pub struct RdgBuffer {
    pub kind: RdgBufferKind,
    pub desc: BufferDesc,
    pub buffer: Option<GfxBufferRef>,
    pub pooled: bool,
}

pub enum RdgResource {
    Texture(RdgTexture),
    Buffer(RdgBuffer),
    ParamBlock(ShaderParamBlock),
}

impl RdgResource {
    pub fn is_pooled(&self) -> bool {
        match self {
            RdgResource::Texture(texture) => texture.pooled,
            RdgResource::Buffer(buffer) => buffer.pooled,
            RdgResource::ParamBlock(_) => false,
        }
    }

    pub fn is_realized(&self) -> bool {
        match self {
            RdgResource::Texture(texture) => texture.texture.is_some(),
            RdgResource::Buffer(buffer) => buffer.buffer.is_some(),
            RdgResource::ParamBlock(_) => true,
        }
    }

    pub fn texture(&self) -> Option<&GfxTextureRef> {
        match self {
            RdgResource::Texture(texture) => texture.texture.as_ref(),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<&GfxBufferRef> {
        match self {
            RdgResource::Buffer(buffer) => buffer.buffer.as_ref(),
            _ => None,
        }
    }

    pub fn param_block(&self) -> Option<&ShaderParamBlock> {
        match self {
            RdgResource::ParamBlock(block) => Some(block),
            _ => None,
        }
    }
}

pub(crate) struct RdgResourceData {
    pub name: SmolStr,
    pub resource: RdgResource,
    pub src_access: GfxAccess,
}
