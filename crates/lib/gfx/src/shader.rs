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
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ember_common::{Error, StringTable, Strid};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use siphasher::sip::SipHasher;
use smol_str::SmolStr;

use crate::{GfxDriver, GfxPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderParamType {
    Float,
    Float4,
    Int,
    UInt,
    Texture,
    Buffer,
    Sampler,
}

impl ShaderParamType {
    pub fn is_constant(self) -> bool {
        matches!(
            self,
            ShaderParamType::Float
                | ShaderParamType::Float4
                | ShaderParamType::Int
                | ShaderParamType::UInt
        )
    }

    pub fn byte_size(self) -> u32 {
        match self {
            ShaderParamType::Float | ShaderParamType::Int | ShaderParamType::UInt => 4,
            ShaderParamType::Float4 => 16,
            _ => 0,
        }
    }
}

/// One shader parameter from reflection. Constants carry an offset into
/// the space's packed constant layout; resources carry a binding slot.
#[derive(Debug, Clone)]
pub struct ShaderParamInfo {
    pub name: SmolStr,
    pub ty: ShaderParamType,
    pub space: i16,
    pub binding: u16,
    pub offset: u32,
    pub size: u32,
}

/// Parameter id valid within one shader's reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub u16);

#[derive(Debug, Default, Clone)]
pub struct ShaderReflection {
    pub params: Vec<ShaderParamInfo>,
}

impl ShaderReflection {
    pub fn find_param(&self, name: &str) -> Option<ParamId> {
        self.params
            .iter()
            .position(|param| param.name == name)
            .map(|index| ParamId(index as u16))
    }

    pub fn param(&self, id: ParamId) -> Option<&ShaderParamInfo> {
        self.params.get(id.0 as usize)
    }

    /// Size of the packed constant layout of one descriptor space.
    pub fn constants_size(&self, space: i16) -> u32 {
        self.params
            .iter()
            .filter(|param| param.space == space && param.ty.is_constant())
            .map(|param| param.offset + param.size)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct Shader {
    pub name: SmolStr,
    pub reflection: Arc<ShaderReflection>,
}

/// Pipeline state lookup key: one compiled variant of a shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PsoDesc {
    pub shader: SmolStr,
    pub technique: SmolStr,
    pub pass: SmolStr,
    pub options: Vec<(SmolStr, SmolStr)>,
    pub vertex_attributes: Vec<SmolStr>,
}

/// Shader registry with parameter resolution and a pipeline-state cache
/// keyed by variant fingerprint.
#[derive(Default)]
pub struct ShaderManager {
    strings: StringTable,
    shaders: RwLock<HashMap<Strid, Arc<Shader>>>,
    pipelines: RwLock<HashMap<u64, GfxPipeline>>,
}

impl ShaderManager {
    pub fn register_shader(&self, name: &str, reflection: ShaderReflection) -> Arc<Shader> {
        let shader = Arc::new(Shader {
            name: SmolStr::new(name),
            reflection: Arc::new(reflection),
        });
        self.shaders
            .write()
            .insert(self.strings.intern(name), shader.clone());
        shader
    }

    pub fn find_shader(&self, name: &str) -> Option<Arc<Shader>> {
        self.shaders.read().get(&self.strings.intern(name)).cloned()
    }

    pub fn find_param(&self, shader: &Shader, name: &str) -> Option<ParamId> {
        shader.reflection.find_param(name)
    }

    /// Look up or compile the pipeline state for a shader variant.
    pub fn get_or_create_pipeline(
        &self,
        driver: &dyn GfxDriver,
        desc: &PsoDesc,
    ) -> Result<GfxPipeline, Error> {
        let key = pso_key(desc);
        let pipelines = self.pipelines.upgradable_read();
        if let Some(pipeline) = pipelines.get(&key) {
            return Ok(*pipeline);
        }
        let mut pipelines = RwLockUpgradableReadGuard::upgrade(pipelines);
        if let Some(pipeline) = pipelines.get(&key) {
            return Ok(*pipeline);
        }
        let pipeline = driver.create_pipeline(desc)?;
        pipelines.insert(key, pipeline);
        Ok(pipeline)
    }
}

fn pso_key(desc: &PsoDesc) -> u64 {
    let mut hasher = SipHasher::default();
    desc.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod test {
    use smol_str::SmolStr;

    use crate::test_driver::TestDriver;

    use super::{PsoDesc, ShaderManager, ShaderParamInfo, ShaderParamType, ShaderReflection};

    fn simple_reflection() -> ShaderReflection {
        ShaderReflection {
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
                    name: SmolStr::new("tint"),
                    ty: ShaderParamType::Float4,
                    space: 0,
                    binding: 0,
                    offset: 16,
                    size: 16,
                },
                ShaderParamInfo {
                    name: SmolStr::new("source"),
                    ty: ShaderParamType::Texture,
                    space: 0,
                    binding: 1,
                    offset: 0,
                    size: 0,
                },
            ],
        }
    }

    #[test]
    fn register_and_resolve() {
        let manager = ShaderManager::default();
        let shader = manager.register_shader("tonemap", simple_reflection());
        assert!(manager.find_shader("tonemap").is_some());
        assert!(manager.find_shader("missing").is_none());

        let id = manager.find_param(&shader, "tint").unwrap();
        let info = shader.reflection.param(id).unwrap();
        assert_eq!(16, info.offset);
        assert!(manager.find_param(&shader, "unknown").is_none());
        assert_eq!(32, shader.reflection.constants_size(0));
    }

    #[test]
    fn pipeline_cache_by_variant() {
        let driver = TestDriver::new();
        let manager = ShaderManager::default();
        let desc = PsoDesc {
            shader: SmolStr::new("tonemap"),
            technique: SmolStr::new("default"),
            pass: SmolStr::new("main"),
            options: vec![(SmolStr::new("HDR"), SmolStr::new("1"))],
            vertex_attributes: vec![SmolStr::new("position")],
        };

        let first = manager.get_or_create_pipeline(driver.as_ref(), &desc).unwrap();
        let again = manager.get_or_create_pipeline(driver.as_ref(), &desc).unwrap();
        assert_eq!(first, again);

        let mut other = desc.clone();
        other.options[0].1 = SmolStr::new("0");
        let second = manager.get_or_create_pipeline(driver.as_ref(), &other).unwrap();
        assert_ne!(first, second);
    }
}
