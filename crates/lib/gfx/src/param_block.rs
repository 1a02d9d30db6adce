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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ember_common::Error;
use log::error;
use smol_str::SmolStr;

use crate::{GfxBufferRef, GfxTextureRef, ParamId, Shader, ShaderParamType};

static NEXT_BLOCK_HANDLE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub enum ParamValue {
    Float(f32),
    Float4([f32; 4]),
    Int(i32),
    UInt(u32),
    Texture(GfxTextureRef),
    Buffer(GfxBufferRef),
}

impl ParamValue {
    fn ty(&self) -> ShaderParamType {
        match self {
            ParamValue::Float(_) => ShaderParamType::Float,
            ParamValue::Float4(_) => ShaderParamType::Float4,
            ParamValue::Int(_) => ShaderParamType::Int,
            ParamValue::UInt(_) => ShaderParamType::UInt,
            ParamValue::Texture(_) => ShaderParamType::Texture,
            ParamValue::Buffer(_) => ShaderParamType::Buffer,
        }
    }
}

/// CPU-side variable values bound to one shader descriptor space. Values
/// are set by parameter id resolved from reflection; `pack` copies them
/// into the space's constant layout and resource tables before the block
/// handle is bound by a pass.
pub struct ShaderParamBlock {
    shader: Arc<Shader>,
    space: i16,
    name: SmolStr,
    vars: Vec<(ParamId, ParamValue)>,
    constants: Vec<u8>,
    textures: Vec<(u16, GfxTextureRef)>,
    buffers: Vec<(u16, GfxBufferRef)>,
    handle: u64,
}

impl ShaderParamBlock {
    pub fn new(shader: Arc<Shader>, space: i16, name: &str) -> Self {
        Self {
            shader,
            space,
            name: SmolStr::new(name),
            vars: Vec::new(),
            constants: Vec::new(),
            textures: Vec::new(),
            buffers: Vec::new(),
            handle: NEXT_BLOCK_HANDLE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> i16 {
        self.space
    }

    /// Resolve a symbolic parameter name against the shader's reflection.
    pub fn find_param(&self, name: &str) -> Result<ParamId, Error> {
        let id = self
            .shader
            .reflection
            .find_param(name)
            .ok_or(Error::InvalidData)?;
        let info = self.shader.reflection.param(id).ok_or(Error::InvalidData)?;
        if info.space != self.space {
            error!(
                "parameter \"{}\" belongs to space {}, block \"{}\" covers space {}",
                name, info.space, self.name, self.space
            );
            return Err(Error::InvalidData);
        }
        Ok(id)
    }

    pub fn set_var(&mut self, id: ParamId, value: ParamValue) {
        if let Some(entry) = self.vars.iter_mut().find(|(var, _)| *var == id) {
            entry.1 = value;
        } else {
            self.vars.push((id, value));
        }
    }

    pub fn set_var_by_name(&mut self, name: &str, value: ParamValue) -> Result<(), Error> {
        let id = self.find_param(name)?;
        self.set_var(id, value);
        Ok(())
    }

    /// Copy every variable into the packed constant layout and the
    /// texture/buffer tables.
    pub fn pack(&mut self) -> Result<(), Error> {
        let reflection = self.shader.reflection.clone();

        self.constants.clear();
        self.constants
            .resize(reflection.constants_size(self.space) as usize, 0);
        self.textures.clear();
        self.buffers.clear();

        for (id, value) in &self.vars {
            let info = reflection.param(*id).ok_or(Error::InvalidData)?;
            if info.ty != value.ty() {
                error!(
                    "parameter \"{}\" of block \"{}\" holds {:?}, expected {:?}",
                    info.name,
                    self.name,
                    value.ty(),
                    info.ty
                );
                return Err(Error::InvalidData);
            }
            match value {
                ParamValue::Float(value) => {
                    write_constant(&mut self.constants, info.offset, &value.to_le_bytes());
                }
                ParamValue::Int(value) => {
                    write_constant(&mut self.constants, info.offset, &value.to_le_bytes());
                }
                ParamValue::UInt(value) => {
                    write_constant(&mut self.constants, info.offset, &value.to_le_bytes());
                }
                ParamValue::Float4(value) => {
                    let mut bytes = [0u8; 16];
                    for (index, item) in value.iter().enumerate() {
                        bytes[index * 4..index * 4 + 4].copy_from_slice(&item.to_le_bytes());
                    }
                    write_constant(&mut self.constants, info.offset, &bytes);
                }
                ParamValue::Texture(texture) => self.textures.push((info.binding, texture.clone())),
                ParamValue::Buffer(buffer) => self.buffers.push((info.binding, buffer.clone())),
            }
        }
        Ok(())
    }

    /// Check that every parameter of this block's space has a value.
    pub fn validate(&self) -> Result<(), Error> {
        for (index, info) in self.shader.reflection.params.iter().enumerate() {
            if info.space != self.space {
                continue;
            }
            let id = ParamId(index as u16);
            if !self.vars.iter().any(|(var, _)| *var == id) {
                error!(
                    "parameter \"{}\" of block \"{}\" left unset",
                    info.name, self.name
                );
                return Err(Error::InvalidData);
            }
        }
        Ok(())
    }

    /// Opaque handle a command list binds at this block's space index.
    pub fn get_param_block(&self) -> u64 {
        self.handle
    }

    pub fn constants(&self) -> &[u8] {
        &self.constants
    }

    pub fn textures(&self) -> &[(u16, GfxTextureRef)] {
        &self.textures
    }

    pub fn buffers(&self) -> &[(u16, GfxBufferRef)] {
        &self.buffers
    }
}

fn write_constant(constants: &mut [u8], offset: u32, bytes: &[u8]) {
    let offset = offset as usize;
    constants[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use ember_common::Error;
    use smol_str::SmolStr;

    use crate::{
        GfxDriver, ParamValue, Shader, ShaderParamInfo, ShaderParamType, ShaderReflection,
        TextureDesc, TextureUsage,
    };

    use super::ShaderParamBlock;

    fn shader() -> Arc<Shader> {
        Arc::new(Shader {
            name: SmolStr::new("tonemap"),
            reflection: Arc::new(ShaderReflection {
                params: vec![
                    ShaderParamInfo {
                        name: SmolStr::new("exposure"),
                        ty: ShaderParamType::Float,
                        space: 0,
                        binding: 0,
                        offset: 0,
                        size: 4,
                    },
                    ShaderParamInfo {
                        name: SmolStr::new("source"),
                        ty: ShaderParamType::Texture,
                        space: 0,
                        binding: 1,
                        offset: 0,
                        size: 0,
                    },
                    ShaderParamInfo {
                        name: SmolStr::new("history"),
                        ty: ShaderParamType::Texture,
                        space: 1,
                        binding: 0,
                        offset: 0,
                        size: 0,
                    },
                ],
            }),
        })
    }

    #[test]
    fn pack_constants_and_resources() {
        let driver = crate::test_driver::TestDriver::new();
        let texture = driver.create_texture(
            TextureDesc::new(crate::GfxFormat::Rgba8, [4, 4]).usage(TextureUsage::SAMPLED),
            "source",
        );

        let mut block = ShaderParamBlock::new(shader(), 0, "tonemap.params");
        block
            .set_var_by_name("exposure", ParamValue::Float(2.0))
            .unwrap();
        block
            .set_var_by_name("source", ParamValue::Texture(texture))
            .unwrap();

        block.pack().unwrap();
        block.validate().unwrap();

        assert_eq!(2.0f32.to_le_bytes().to_vec(), block.constants().to_vec());
        assert_eq!(1, block.textures().len());
        assert_eq!(1, block.textures()[0].0);
        assert!(block.get_param_block() != 0);
    }

    #[test]
    fn unset_parameter_fails_validation() {
        let mut block = ShaderParamBlock::new(shader(), 0, "tonemap.params");
        block
            .set_var_by_name("exposure", ParamValue::Float(1.0))
            .unwrap();
        block.pack().unwrap();
        assert_eq!(Err(Error::InvalidData), block.validate());
    }

    #[test]
    fn foreign_space_parameter_is_rejected() {
        let block = ShaderParamBlock::new(shader(), 0, "tonemap.params");
        assert_eq!(Err(Error::InvalidData), block.find_param("history").map(|_| ()));
        assert_eq!(Err(Error::InvalidData), block.find_param("unknown").map(|_| ()));
    }

    #[test]
    fn type_mismatch_fails_pack() {
        let mut block = ShaderParamBlock::new(shader(), 0, "tonemap.params");
        let id = block.find_param("exposure").unwrap();
        block.set_var(id, ParamValue::Int(3));
        assert_eq!(Err(Error::InvalidData), block.pack());
    }
}
