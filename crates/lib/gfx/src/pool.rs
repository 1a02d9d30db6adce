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

use parking_lot::Mutex;
use siphasher::sip::SipHasher;

use crate::{BufferDesc, GfxBufferRef, GfxDriver, GfxTextureRef, TextureDesc};

/// Frames an entry may sit unused before `gc` destroys it.
const EVICT_AGE_FRAMES: u64 = 3;

struct PooledTexture {
    texture: GfxTextureRef,
    last_used: u64,
}

struct PooledBuffer {
    buffer: GfxBufferRef,
    last_used: u64,
}

/// Reuses transient GPU objects across frames. Entries are bucketed by a
/// descriptor fingerprint; shared between graphs and internally locked.
pub struct RdgPool {
    driver: Arc<dyn GfxDriver>,
    textures: Mutex<HashMap<u64, Vec<PooledTexture>>>,
    buffers: Mutex<HashMap<u64, Vec<PooledBuffer>>>,
}

impl RdgPool {
    pub fn new(driver: Arc<dyn GfxDriver>) -> Self {
        Self {
            driver,
            textures: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire_texture(&self, desc: &TextureDesc, name: &str) -> GfxTextureRef {
        let key = fingerprint(desc);
        if let Some(entry) = self
            .textures
            .lock()
            .get_mut(&key)
            .and_then(|bucket| bucket.pop())
        {
            return entry.texture;
        }
        self.driver.create_texture(*desc, name)
    }

    pub fn release_texture(&self, texture: GfxTextureRef) {
        let key = fingerprint(&texture.desc);
        self.textures
            .lock()
            .entry(key)
            .or_default()
            .push(PooledTexture {
                texture,
                last_used: self.driver.frame_number(),
            });
    }

    pub fn acquire_buffer(&self, desc: &BufferDesc, name: &str) -> GfxBufferRef {
        let key = fingerprint(desc);
        if let Some(entry) = self
            .buffers
            .lock()
            .get_mut(&key)
            .and_then(|bucket| bucket.pop())
        {
            return entry.buffer;
        }
        self.driver.create_buffer(*desc, name)
    }

    pub fn release_buffer(&self, buffer: GfxBufferRef) {
        let key = fingerprint(&buffer.desc);
        self.buffers
            .lock()
            .entry(key)
            .or_default()
            .push(PooledBuffer {
                buffer,
                last_used: self.driver.frame_number(),
            });
    }

    /// Drop entries that sat unused for [`EVICT_AGE_FRAMES`] frames.
    /// Called once at frame end.
    pub fn gc(&self) {
        let frame = self.driver.frame_number();

        let mut textures = self.textures.lock();
        for bucket in textures.values_mut() {
            bucket.retain(|entry| frame.saturating_sub(entry.last_used) < EVICT_AGE_FRAMES);
        }
        textures.retain(|_, bucket| !bucket.is_empty());

        let mut buffers = self.buffers.lock();
        for bucket in buffers.values_mut() {
            bucket.retain(|entry| frame.saturating_sub(entry.last_used) < EVICT_AGE_FRAMES);
        }
        buffers.retain(|_, bucket| !bucket.is_empty());
    }
}

fn fingerprint<T: Hash>(desc: &T) -> u64 {
    let mut hasher = SipHasher::default();
    desc.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod test {
    use crate::test_driver::TestDriver;
    use crate::{BufferDesc, BufferUsage, GfxFormat, TextureDesc, TextureUsage};

    use super::RdgPool;

    fn color_desc() -> TextureDesc {
        TextureDesc::new(GfxFormat::Rgba8, [128, 128])
            .usage(TextureUsage::SAMPLED | TextureUsage::COLOR_TARGET)
    }

    #[test]
    fn acquire_reuses_released() {
        let driver = TestDriver::new();
        let pool = RdgPool::new(driver.clone());

        let first = pool.acquire_texture(&color_desc(), "target");
        let first_id = first.id;
        pool.release_texture(first);

        let again = pool.acquire_texture(&color_desc(), "target");
        assert_eq!(first_id, again.id);
        assert_eq!(1, driver.created_textures());

        // A different descriptor creates a fresh object.
        let other = pool.acquire_texture(
            &TextureDesc::new(GfxFormat::D32Float, [128, 128]).usage(TextureUsage::DEPTH_TARGET),
            "depth",
        );
        assert_ne!(first_id, other.id);
        assert_eq!(2, driver.created_textures());
    }

    #[test]
    fn gc_drops_stale_entries() {
        let driver = TestDriver::new();
        let pool = RdgPool::new(driver.clone());

        let texture = pool.acquire_texture(&color_desc(), "target");
        pool.release_texture(texture);

        driver.advance_frame(2);
        pool.gc();
        let kept = pool.acquire_texture(&color_desc(), "target");
        assert_eq!(1, driver.created_textures());
        pool.release_texture(kept);

        driver.advance_frame(4);
        pool.gc();
        pool.acquire_texture(&color_desc(), "target");
        assert_eq!(2, driver.created_textures());
    }

    #[test]
    fn buffers_pool_too() {
        let driver = TestDriver::new();
        let pool = RdgPool::new(driver.clone());
        let desc = BufferDesc::new(256, BufferUsage::STORAGE);

        let buffer = pool.acquire_buffer(&desc, "scratch");
        let id = buffer.id;
        pool.release_buffer(buffer);
        assert_eq!(id, pool.acquire_buffer(&desc, "scratch").id);
    }
}
