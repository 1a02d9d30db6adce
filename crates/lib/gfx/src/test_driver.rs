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

//! Recording driver for executor tests. Commands turn into strings; only
//! submitted command lists reach the visible log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ember_common::Error;
use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::{
    BufferDesc, GfxBuffer, GfxBufferRef, GfxCmdList, GfxDriver, GfxPipeline, GfxQueueType,
    GfxTexture, GfxTextureRef, ImageBarrierKind, PsoDesc, TextureDesc,
};

pub(crate) struct TestDriver {
    submitted: Mutex<Vec<String>>,
    pending: Mutex<Vec<Arc<Mutex<Vec<String>>>>>,
    next_id: AtomicU64,
    frame: AtomicU64,
    created_textures: AtomicU64,
    gfx_thread: ThreadId,
}

impl TestDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            frame: AtomicU64::new(0),
            created_textures: AtomicU64::new(0),
            gfx_thread: thread::current().id(),
        })
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().clone()
    }

    pub fn created_textures(&self) -> u64 {
        self.created_textures.load(Ordering::Relaxed)
    }

    pub fn advance_frame(&self, frames: u64) {
        self.frame.fetch_add(frames, Ordering::Relaxed);
    }
}

struct TestCmdList {
    recorded: Arc<Mutex<Vec<String>>>,
}

impl TestCmdList {
    fn record(&mut self, command: String) {
        self.recorded.lock().push(command);
    }
}

impl GfxCmdList for TestCmdList {
    fn barrier_image(
        &mut self,
        texture: &GfxTextureRef,
        src: ImageBarrierKind,
        dst: ImageBarrierKind,
    ) {
        self.record(format!("barrier image:{} {:?}->{:?}", texture.name, src, dst));
    }

    fn barrier_buffer(&mut self, buffer: &GfxBufferRef) {
        self.record(format!("barrier buffer:{}", buffer.name));
    }

    fn begin_render_pass(&mut self, colors: &[GfxTextureRef], depth: Option<&GfxTextureRef>) {
        let colors = colors
            .iter()
            .map(|texture| texture.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let depth = depth.map(|texture| texture.name.as_str()).unwrap_or("none");
        self.record(format!("begin_render_pass colors:[{}] depth:{}", colors, depth));
    }

    fn end_render_pass(&mut self) {
        self.record("end_render_pass".to_owned());
    }

    fn begin_label(&mut self, label: &str) {
        self.record(format!("begin_label {}", label));
    }

    fn end_label(&mut self) {
        self.record("end_label".to_owned());
    }

    fn bind_pipeline(&mut self, pipeline: GfxPipeline) {
        self.record(format!("bind_pipeline {}", pipeline.id));
    }

    fn bind_param_block(&mut self, space: i16, block: u64) {
        self.record(format!("bind_param_block space:{} block:{}", space, block));
    }

    fn draw(&mut self, vertices: u32, instances: u32) {
        self.record(format!("draw {}x{}", vertices, instances));
    }

    fn dispatch(&mut self, groups: [u32; 3]) {
        self.record(format!("dispatch {:?}", groups));
    }

    fn copy_texture(&mut self, src: &GfxTextureRef, dst: &GfxTextureRef) {
        self.record(format!("copy {}->{}", src.name, dst.name));
    }

    fn update_buffer(&mut self, buffer: &GfxBufferRef, offset: u64, bytes: &[u8]) {
        self.record(format!(
            "update buffer:{} offset:{} size:{}",
            buffer.name,
            offset,
            bytes.len()
        ));
    }
}

impl GfxDriver for TestDriver {
    fn acquire_cmd_list(&self, _queue: GfxQueueType) -> Box<dyn GfxCmdList> {
        assert_eq!(
            self.gfx_thread,
            thread::current().id(),
            "command lists belong to the gfx thread"
        );
        let recorded = Arc::new(Mutex::new(Vec::new()));
        self.pending.lock().push(recorded.clone());
        Box::new(TestCmdList { recorded })
    }

    fn submit_cmd_list(&self, _cmd_list: Box<dyn GfxCmdList>) -> Result<(), Error> {
        assert_eq!(
            self.gfx_thread,
            thread::current().id(),
            "submission belongs to the gfx thread"
        );
        let recorded = self.pending.lock().pop().expect("nothing to submit");
        self.submitted.lock().extend(recorded.lock().drain(..));
        Ok(())
    }

    fn create_texture(&self, desc: TextureDesc, name: &str) -> GfxTextureRef {
        self.created_textures.fetch_add(1, Ordering::Relaxed);
        Arc::new(GfxTexture {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: SmolStr::new(name),
            desc,
        })
    }

    fn create_buffer(&self, desc: BufferDesc, name: &str) -> GfxBufferRef {
        Arc::new(GfxBuffer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: SmolStr::new(name),
            desc,
        })
    }

    fn create_pipeline(&self, _desc: &PsoDesc) -> Result<GfxPipeline, Error> {
        Ok(GfxPipeline {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn frame_number(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }
}
