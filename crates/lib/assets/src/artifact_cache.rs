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
use std::sync::Arc;

use ember_common::stream::Stream;
use ember_common::tree::{read_field, write_field, TreeNode, TreeRead, TreeWrite};
use ember_common::{sha256, Async, Error, IoContext, Sha256, TaskPool, Uuid};
use ember_vfs::{AsyncFileSystem, FileEntryKind, FileSystem};
use log::error;
use parking_lot::Mutex;

use crate::{ArtifactObject, AssetArtifact, ClassRegistry, ClassTag};

const ARTIFACT_FILE_EXT: &str = ".data";
const ARTIFACT_META_EXT: &str = ".artifact";

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    cls: ClassTag,
    size: u64,
    hash: Sha256,
}

/// Meta document stored along with an artifact payload.
#[derive(Debug, Default, Clone, PartialEq)]
struct ArtifactMeta {
    hash: Sha256,
    name: String,
    size: u64,
    cls: ClassTag,
}

impl TreeWrite for ArtifactMeta {
    fn tree_write(&self, context: &IoContext, node: &mut TreeNode) -> Result<(), Error> {
        node.as_map();
        write_field(context, node, "hash", &self.hash)?;
        write_field(context, node, "name", &self.name)?;
        write_field(context, node, "size", &self.size)?;
        write_field(context, node, "cls", &self.cls)?;
        Ok(())
    }
}

impl TreeRead for ArtifactMeta {
    fn tree_read(context: &IoContext, node: &TreeNode) -> Result<Self, Error> {
        Ok(Self {
            hash: read_field(context, node, "hash")?,
            name: read_field(context, node, "name")?,
            size: read_field(context, node, "size")?,
            cls: read_field(context, node, "cls")?,
        })
    }
}

/// Content-addressed store of derived payloads. Every artifact is two
/// files in the cache directory: `<uuid>.data` with the raw payload and
/// `<uuid>.artifact` with the meta document.
pub struct AssetArtifactCache {
    cache_path: String,
    context: IoContext,
    file_system: Arc<dyn FileSystem>,
    async_file_system: Arc<AsyncFileSystem>,
    task_pool: TaskPool,
    artifacts: Mutex<HashMap<Uuid, Entry>>,
}

impl AssetArtifactCache {
    pub fn new(
        cache_path: String,
        context: IoContext,
        file_system: Arc<dyn FileSystem>,
        async_file_system: Arc<AsyncFileSystem>,
        task_pool: TaskPool,
    ) -> Self {
        Self {
            cache_path,
            context,
            file_system,
            async_file_system,
            task_pool,
            artifacts: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the in-memory index from the meta documents found in the
    /// cache directory. Idempotent.
    pub fn load_cache(&self) -> Result<(), Error> {
        let mut artifacts = self.artifacts.lock();

        let files = self.file_system.list_directory(&self.cache_path)?;
        for file in files {
            if file.kind != FileEntryKind::File || !file.name.ends_with(ARTIFACT_META_EXT) {
                continue;
            }

            let artifact_id = artifact_id_from_meta(&file.name)?;
            let bytes = self.file_system.read_file(&self.meta_name(artifact_id))?;
            let text = String::from_utf8(bytes).map_err(|_| Error::FailedParse)?;
            let meta = ArtifactMeta::tree_read(&self.context, &TreeNode::parse_yaml(&text)?)?;

            artifacts.insert(
                artifact_id,
                Entry {
                    name: meta.name,
                    cls: meta.cls,
                    size: meta.size,
                    hash: meta.hash,
                },
            );
        }

        Ok(())
    }

    /// Store a new artifact, returning its freshly allocated id. The
    /// payload is written first, then the meta document.
    pub fn add(&self, artifact: &dyn ArtifactObject, name: &str) -> Result<Uuid, Error> {
        let mut artifacts = self.artifacts.lock();

        let artifact_id = gen_artifact_uuid(&artifacts);

        let mut payload = Vec::new();
        {
            let mut stream = Stream::writer(&mut payload);
            artifact.write_to_stream(&self.context, &mut stream)?;
        }
        self.file_system
            .save_file(&self.file_name(artifact_id), &payload)?;

        let meta = ArtifactMeta {
            hash: sha256(&payload),
            name: name.to_owned(),
            size: payload.len() as u64,
            cls: artifact.class_tag(),
        };
        let mut node = TreeNode::default();
        meta.tree_write(&self.context, &mut node)?;
        self.file_system
            .save_file(&self.meta_name(artifact_id), node.emit_yaml()?.as_bytes())?;

        artifacts.insert(
            artifact_id,
            Entry {
                name: meta.name,
                cls: meta.cls,
                size: meta.size,
                hash: meta.hash,
            },
        );
        Ok(artifact_id)
    }

    pub fn has(&self, artifact_id: Uuid) -> bool {
        self.artifacts.lock().contains_key(&artifact_id)
    }

    pub fn get_info(&self, artifact_id: Uuid) -> Result<AssetArtifact, Error> {
        let artifacts = self.artifacts.lock();
        let entry = artifacts.get(&artifact_id).ok_or(Error::NoArtifact)?;
        Ok(AssetArtifact {
            uuid: artifact_id,
            cls: entry.cls.clone(),
            size: entry.size,
            hash: entry.hash,
        })
    }

    /// Read a payload into `buffer` and deserialize it into `artifact`.
    /// The returned handle completes after both steps; deserialization is
    /// scheduled on the task pool behind the file read.
    pub fn read(
        &self,
        artifact_id: Uuid,
        buffer: Vec<u8>,
        mut artifact: Box<dyn ArtifactObject>,
    ) -> Async<Box<dyn ArtifactObject>> {
        {
            let artifacts = self.artifacts.lock();
            let entry = match artifacts.get(&artifact_id) {
                Some(entry) => entry,
                None => {
                    error!("no entry to load artifact {}", artifact_id);
                    return Async::failed(Error::NoArtifact);
                }
            };
            if entry.cls != artifact.class_tag() {
                error!("invalid artifact instance type for {}", artifact_id);
                return Async::failed(Error::InvalidData);
            }
            if entry.size != buffer.len() as u64 {
                error!("artifact buffer size mismatch for {}", artifact_id);
                return Async::failed(Error::InvalidData);
            }
        }

        let read_file = self
            .async_file_system
            .read_file(&self.file_name(artifact_id), buffer);

        let context = self.context.clone();
        read_file.then(&self.task_pool, move |bytes| {
            let mut stream = Stream::reader(bytes.as_slice());
            artifact
                .read_from_stream(&context, &mut stream)
                .map_err(|_| {
                    error!("failed to read artifact {}", artifact_id);
                    Error::FailedParse
                })?;
            Ok(artifact)
        })
    }

    /// Like [`AssetArtifactCache::read`], with the instance constructed
    /// from the stored class through the registry carried in the
    /// serialization context.
    pub fn read_instantiate(
        &self,
        artifact_id: Uuid,
        buffer: Vec<u8>,
    ) -> Async<Box<dyn ArtifactObject>> {
        let cls = {
            let artifacts = self.artifacts.lock();
            match artifacts.get(&artifact_id) {
                Some(entry) => entry.cls.clone(),
                None => {
                    error!("no entry to load artifact {}", artifact_id);
                    return Async::failed(Error::NoArtifact);
                }
            }
        };

        let Some(registry) = self.context.get::<ClassRegistry>() else {
            error!("no class registry to instantiate artifact {}", artifact_id);
            return Async::failed(Error::InvalidState);
        };
        let Some(artifact) = registry.construct(&cls) else {
            error!("unknown artifact class {} for {}", cls, artifact_id);
            return Async::failed(Error::InvalidData);
        };

        self.read(artifact_id, buffer, artifact)
    }

    pub fn remove(&self, artifact_id: Uuid) -> Result<(), Error> {
        let mut artifacts = self.artifacts.lock();

        if artifacts.remove(&artifact_id).is_none() {
            return Err(Error::NoArtifact);
        }
        self.file_system.remove_file(&self.file_name(artifact_id))?;
        self.file_system.remove_file(&self.meta_name(artifact_id))?;
        Ok(())
    }

    fn file_name(&self, artifact_id: Uuid) -> String {
        format!("{}/{}{}", self.cache_path, artifact_id, ARTIFACT_FILE_EXT)
    }

    fn meta_name(&self, artifact_id: Uuid) -> String {
        format!("{}/{}{}", self.cache_path, artifact_id, ARTIFACT_META_EXT)
    }
}

fn gen_artifact_uuid(artifacts: &HashMap<Uuid, Entry>) -> Uuid {
    loop {
        let id = Uuid::generate();
        if !artifacts.contains_key(&id) {
            return id;
        }
    }
}

fn artifact_id_from_meta(file_name: &str) -> Result<Uuid, Error> {
    let stem = file_name
        .strip_suffix(ARTIFACT_META_EXT)
        .ok_or(Error::FailedParse)?;
    Uuid::parse(stem, 10)
}

#[cfg(test)]
mod test {
    use std::any::Any;
    use std::sync::Arc;

    use ember_common::stream::{Stream, StreamRead, StreamWrite};
    use ember_common::{sha256, Error, IoContext, TaskPool, Uuid};
    use ember_vfs::{AsyncFileSystem, FileSystem, MountFileSystem};

    use crate::{ArtifactClass, ArtifactObject, ClassTag};

    use super::AssetArtifactCache;

    #[derive(Debug, Default, PartialEq)]
    struct BytesArtifact {
        bytes: Vec<u8>,
    }

    impl ArtifactObject for BytesArtifact {
        fn class_tag(&self) -> ClassTag {
            ClassTag::new(Self::CLASS)
        }

        fn write_to_stream(&self, _context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
            // Raw bytes, no length prefix: the payload length is the size.
            stream.nwrite(&self.bytes)
        }

        fn read_from_stream(
            &mut self,
            _context: &IoContext,
            stream: &mut Stream,
        ) -> Result<(), Error> {
            stream.nread(&mut self.bytes)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl ArtifactClass for BytesArtifact {
        const CLASS: &'static str = "BytesArtifact";
    }

    #[derive(Debug, Default, PartialEq)]
    struct CurveArtifact {
        keys: Vec<u32>,
    }

    impl ArtifactObject for CurveArtifact {
        fn class_tag(&self) -> ClassTag {
            ClassTag::new(Self::CLASS)
        }

        fn write_to_stream(&self, context: &IoContext, stream: &mut Stream) -> Result<(), Error> {
            self.keys.stream_write(context, stream)
        }

        fn read_from_stream(
            &mut self,
            context: &IoContext,
            stream: &mut Stream,
        ) -> Result<(), Error> {
            self.keys = Vec::stream_read(context, stream)?;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl ArtifactClass for CurveArtifact {
        const CLASS: &'static str = "CurveArtifact";
    }

    #[derive(Debug, Default)]
    struct OtherArtifact;

    impl ArtifactObject for OtherArtifact {
        fn class_tag(&self) -> ClassTag {
            ClassTag::new("OtherArtifact")
        }

        fn write_to_stream(&self, _context: &IoContext, _stream: &mut Stream) -> Result<(), Error> {
            Ok(())
        }

        fn read_from_stream(
            &mut self,
            _context: &IoContext,
            _stream: &mut Stream,
        ) -> Result<(), Error> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn make_cache(dir: &std::path::Path) -> AssetArtifactCache {
        make_cache_with(dir, IoContext::default())
    }

    fn make_cache_with(dir: &std::path::Path, context: IoContext) -> AssetArtifactCache {
        let file_system: Arc<dyn FileSystem> = {
            let fs = Arc::new(MountFileSystem::default());
            fs.mount("cache", dir);
            fs
        };
        let pool = TaskPool::with_threads(2);
        let async_fs = Arc::new(AsyncFileSystem::new(file_system.clone(), pool.clone()));
        AssetArtifactCache::new("cache".to_owned(), context, file_system, async_fs, pool)
    }

    #[test]
    fn add_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache(dir.path());

        let payload = BytesArtifact {
            bytes: vec![0x01, 0x02, 0x03, 0x04],
        };
        let id = cache.add(&payload, "x").unwrap();
        assert!(cache.has(id));

        let info = cache.get_info(id).unwrap();
        assert_eq!(ClassTag::new("BytesArtifact"), info.cls);
        assert_eq!(4, info.size);
        assert_eq!(sha256(&[1, 2, 3, 4]), info.hash);

        let read = cache.read(
            id,
            vec![0u8; 4],
            Box::new(BytesArtifact {
                bytes: vec![0u8; 4],
            }),
        );
        let object = read.take().unwrap();
        let object = object.as_any().downcast_ref::<BytesArtifact>().unwrap();
        assert_eq!(payload, *object);
    }

    #[test]
    fn read_instantiate_dispatches_by_class() {
        let registry = Arc::new(crate::ClassRegistry::default());
        registry.register::<CurveArtifact>();

        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache_with(dir.path(), IoContext::default().with(registry));

        let payload = CurveArtifact {
            keys: vec![5, 6, 7],
        };
        let id = cache.add(&payload, "curve").unwrap();
        let info = cache.get_info(id).unwrap();

        let object = cache
            .read_instantiate(id, vec![0u8; info.size as usize])
            .take()
            .unwrap();
        let object = object.as_any().downcast_ref::<CurveArtifact>().unwrap();
        assert_eq!(payload, *object);

        // Without a registry in the context the read fails up front.
        let plain = make_cache(dir.path());
        plain.load_cache().unwrap();
        assert_eq!(
            Err(Error::InvalidState),
            plain
                .read_instantiate(id, vec![0u8; info.size as usize])
                .wait()
        );
    }

    #[test]
    fn read_missing_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache(dir.path());
        let read = cache.read(Uuid::generate(), Vec::new(), Box::<BytesArtifact>::default());
        assert_eq!(Err(Error::NoArtifact), read.wait());
    }

    #[test]
    fn read_class_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache(dir.path());
        let id = cache
            .add(&BytesArtifact { bytes: vec![1, 2] }, "blob")
            .unwrap();
        let read = cache.read(id, vec![0u8; 2], Box::<OtherArtifact>::default());
        assert_eq!(Err(Error::InvalidData), read.wait());
    }

    #[test]
    fn remove_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = make_cache(dir.path());
        let id = cache
            .add(&BytesArtifact { bytes: vec![7, 8] }, "blob")
            .unwrap();

        cache.remove(id).unwrap();
        assert!(!cache.has(id));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
        assert_eq!(Err(Error::NoArtifact), cache.remove(id));
    }

    #[test]
    fn load_cache_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let cache = make_cache(dir.path());
            cache
                .add(&BytesArtifact { bytes: vec![9] }, "persisted")
                .unwrap()
        };

        let cache = make_cache(dir.path());
        assert!(!cache.has(id));
        cache.load_cache().unwrap();
        assert!(cache.has(id));
        let info = cache.get_info(id).unwrap();
        assert_eq!(1, info.size);

        // Loading again reinstates the same single entry.
        cache.load_cache().unwrap();
        assert!(cache.has(id));
    }
}
