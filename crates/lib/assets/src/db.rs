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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ember_common::stream::{Stream, StreamRead, StreamWrite};
use ember_common::tree::{TreeNode, TreeRead, TreeWrite};
use ember_common::{Error, IoContext, Uuid};
use ember_vfs::FileSystem;
use log::{error, info};
use parking_lot::Mutex;

use crate::{
    asset_meta_file, AssetArtifact, AssetArtifactCache, AssetData, AssetFlags, AssetImportArtifact,
    AssetImportEnv, AssetImportResult, AssetManifest, AssetMetaData, AssetResolver, AssetSource,
    ClassTag,
};

/// Everything a loader needs to instantiate an asset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssetLoadingInfo {
    pub cls: ClassTag,
    pub loader: ClassTag,
    pub deps: Vec<Uuid>,
    pub artifacts: Vec<Uuid>,
}

/// Everything an importer needs to redo an import.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssetImportSetup {
    pub path: String,
    pub importer: ClassTag,
    pub import_settings: TreeNode,
    pub import_env: AssetImportEnv,
}

#[derive(Default)]
struct AssetDbInner {
    assets: HashMap<Uuid, AssetData>,
    reserved: HashSet<Uuid>,
}

/// Persistent metadata store for source assets, their imports and derived
/// artifacts. One mutex guards all rows; public entry points take it once
/// and delegate to lock-free internals.
pub struct AssetDb {
    file_path: String,
    context: IoContext,
    file_system: Arc<dyn FileSystem>,
    resolver: Arc<AssetResolver>,
    artifact_cache: Arc<AssetArtifactCache>,
    inner: Mutex<AssetDbInner>,
}

impl AssetDb {
    pub fn new(
        file_path: String,
        context: IoContext,
        file_system: Arc<dyn FileSystem>,
        resolver: Arc<AssetResolver>,
        artifact_cache: Arc<AssetArtifactCache>,
    ) -> Self {
        Self {
            file_path,
            context,
            file_system,
            resolver,
            artifact_cache,
            inner: Mutex::new(AssetDbInner::default()),
        }
    }

    pub fn has_asset(&self, asset_id: Uuid) -> bool {
        self.inner.lock().assets.contains_key(&asset_id)
    }

    pub fn find_asset(&self, path: &str) -> Option<Uuid> {
        let inner = self.inner.lock();
        inner
            .assets
            .values()
            .find_map(|asset| (asset.path == path).then_some(asset.uuid))
    }

    pub fn get_asset_data(&self, asset_id: Uuid) -> Result<AssetData, Error> {
        let inner = self.inner.lock();
        inner.assets.get(&asset_id).cloned().ok_or(Error::NoAsset)
    }

    /// Id of the asset that owns `asset_id`, or `asset_id` itself when it
    /// is a root.
    pub fn resolve_asset_parent(&self, asset_id: Uuid) -> Option<Uuid> {
        let inner = self.inner.lock();
        let asset = inner.assets.get(&asset_id)?;
        Some(if asset.parent.is_not_null() {
            asset.parent
        } else {
            asset_id
        })
    }

    pub fn import_asset(
        &self,
        flags: AssetFlags,
        importer: ClassTag,
        import_settings: TreeNode,
        import_result: AssetImportResult,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.import_asset_locked(&mut inner, flags, importer, import_settings, import_result)
    }

    /// Replace an existing asset with a fresh import result. Flags and
    /// importer of the previous import are preserved.
    pub fn reimport_asset(
        &self,
        asset_id: Uuid,
        import_settings: TreeNode,
        import_result: AssetImportResult,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        let Some(asset) = inner.assets.get(&asset_id) else {
            error!("no asset to re-import with uuid {}", asset_id);
            return Err(Error::NoAsset);
        };
        if asset_id != import_result.main.uuid {
            error!(
                "unexpected main asset id {} for {}",
                import_result.main.uuid, asset_id
            );
            return Err(Error::InvalidData);
        }

        let flags = asset.flags;
        let importer = asset.importer.clone();

        self.remove_asset_locked(&mut inner, asset_id)?;
        self.import_asset_locked(&mut inner, flags, importer, import_settings, import_result)
    }

    /// Install a prepared row with its uuid already assigned.
    pub fn add_asset(&self, asset_data: AssetData) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.add_asset_locked(&mut inner, asset_data)
    }

    /// Install a prepared row under a freshly allocated uuid.
    pub fn add_asset_alloc(&self, mut asset_data: AssetData) -> Result<Uuid, Error> {
        let mut inner = self.inner.lock();
        let asset_id = self.gen_asset_uuid_locked(&mut inner);
        asset_data.uuid = asset_id;
        self.add_asset_locked(&mut inner, asset_data)?;
        Ok(asset_id)
    }

    pub fn create_asset_from_meta(
        &self,
        asset_path: &str,
        asset_meta_data: AssetMetaData,
    ) -> Result<Uuid, Error> {
        let mut inner = self.inner.lock();
        self.create_asset_from_meta_locked(&mut inner, asset_path, asset_meta_data)
    }

    pub fn create_asset_from_meta_path(
        &self,
        asset_path: &str,
        skip_if_exists: bool,
    ) -> Result<Uuid, Error> {
        let mut inner = self.inner.lock();
        self.create_asset_from_meta_path_locked(&mut inner, asset_path, skip_if_exists)
    }

    pub fn remove_asset(&self, asset_id: Uuid) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.remove_asset_locked(&mut inner, asset_id)
    }

    /// Ids of assets listing `asset_id` among their children.
    pub fn collect_asset_usages(&self, asset_id: Uuid) -> Result<Vec<Uuid>, Error> {
        let inner = self.inner.lock();
        if !inner.assets.contains_key(&asset_id) {
            return Err(Error::NoAsset);
        }
        Ok(inner
            .assets
            .values()
            .filter(|asset| asset.children.contains(&asset_id))
            .map(|asset| asset.uuid)
            .collect())
    }

    pub fn validate_asset_artifacts(&self, asset_id: Uuid) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.validate_asset_artifacts_locked(&mut inner, asset_id)
    }

    pub fn invalidate_asset_artifacts(&self, asset_id: Uuid) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.invalidate_asset_artifacts_locked(&mut inner, asset_id)
    }

    pub fn get_asset_import_settings(&self, asset_id: Uuid) -> Result<AssetImportSetup, Error> {
        let inner = self.inner.lock();
        let asset = inner.assets.get(&asset_id).ok_or(Error::NoAsset)?;
        Ok(AssetImportSetup {
            path: asset.path.clone(),
            importer: asset.importer.clone(),
            import_settings: asset.import_settings.clone(),
            import_env: asset.import_env.clone(),
        })
    }

    pub fn get_asset_meta(&self, asset_id: Uuid) -> Result<AssetMetaData, Error> {
        let inner = self.inner.lock();
        let asset = inner.assets.get(&asset_id).ok_or(Error::NoAsset)?;
        Ok(asset_meta_of(asset))
    }

    pub fn get_asset_loading_info(&self, asset_id: Uuid) -> Result<AssetLoadingInfo, Error> {
        let inner = self.inner.lock();
        let asset = inner.assets.get(&asset_id).ok_or(Error::NoAsset)?;
        Ok(AssetLoadingInfo {
            cls: asset.cls.clone(),
            loader: asset.loader.clone(),
            deps: asset.deps.clone(),
            artifacts: asset
                .artifacts
                .iter()
                .map(|artifact| artifact.uuid)
                .collect(),
        })
    }

    pub fn save_asset_meta(&self, asset_id: Uuid) -> Result<(), Error> {
        let inner = self.inner.lock();
        self.save_asset_meta_locked(&inner, asset_id)
    }

    /// True when the asset has to be imported again: no recorded sources,
    /// no cached artifacts, a source file newer than recorded, or a child
    /// left without artifacts. A child id is remapped to its parent before
    /// the checks run.
    pub fn need_asset_reimport(&self, asset_id: Uuid) -> Result<bool, Error> {
        let inner = self.inner.lock();

        let mut asset_id = asset_id;
        let asset = inner.assets.get(&asset_id).ok_or(Error::NoAsset)?;
        if asset.parent.is_not_null() {
            asset_id = asset.parent;
        }
        let asset = inner.assets.get(&asset_id).ok_or(Error::NoAsset)?;

        if asset.sources.is_empty() || asset.artifacts.is_empty() {
            return Ok(true);
        }

        for source in &asset.sources {
            let timestamp = self.file_system.file_timestamp(&source.path)?;
            if timestamp > source.timestamp {
                return Ok(true);
            }
        }

        for child_id in &asset.children {
            let child = inner.assets.get(child_id).ok_or(Error::NoAsset)?;
            if child.artifacts.is_empty() {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Register every asset listed in a manifest document. Entries that
    /// fail are logged and skipped; returns the number created.
    pub fn load_manifest(&self, manifest_path: &str) -> Result<usize, Error> {
        let manifest = {
            let bytes = self.file_system.read_file(manifest_path)?;
            let text = String::from_utf8(bytes).map_err(|_| Error::FailedParse)?;
            AssetManifest::tree_read(&self.context, &TreeNode::parse_yaml(&text)?)?
        };

        let folder = manifest_path
            .rsplit_once('/')
            .map(|(folder, _)| folder)
            .unwrap_or_default();

        let mut inner = self.inner.lock();
        let mut counter = 0;
        for asset in &manifest.assets {
            let asset = asset.strip_prefix("./").unwrap_or(asset);
            let asset_path = if folder.is_empty() {
                asset.to_owned()
            } else {
                format!("{}/{}", folder, asset)
            };
            match self.create_asset_from_meta_path_locked(&mut inner, &asset_path, true) {
                Ok(_) => counter += 1,
                Err(err) => {
                    error!(
                        "failed to create from manifest asset, skipping {}: {}",
                        asset_path, err
                    );
                }
            }
        }

        info!(
            "created {} asset(s) from manifest {}",
            counter, manifest_path
        );
        Ok(counter)
    }

    pub fn save_db(&self) -> Result<(), Error> {
        let inner = self.inner.lock();

        let rows = inner.assets.values().cloned().collect::<Vec<_>>();

        let writer = self.file_system.open_write(&self.file_path)?;
        let mut stream = Stream::writer(writer);
        rows.stream_write(&self.context, &mut stream)?;

        info!("saved {} asset(s) to {}", rows.len(), self.file_path);
        Ok(())
    }

    pub fn load_db(&self, allow_missing: bool) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        if !self.file_system.exists(&self.file_path) {
            if allow_missing {
                info!(
                    "no asset db to load {}, ok - creating empty",
                    self.file_path
                );
                return Ok(());
            }
            error!("no asset db to load {}", self.file_path);
            return Err(Error::FailedFindFile);
        }

        let reader = self.file_system.open_read(&self.file_path)?;
        let mut stream = Stream::reader(reader);
        let rows = Vec::<AssetData>::stream_read(&self.context, &mut stream)?;

        let count = rows.len();
        for row in rows {
            self.add_asset_locked(&mut inner, row)?;
        }

        info!("loaded {} asset(s) from {}", count, self.file_path);
        Ok(())
    }

    /// Drop every root asset whose meta file disappeared from disk.
    /// Returns `(removed, preserved)` row counts.
    pub fn reconcile_db(&self) -> Result<(usize, usize), Error> {
        let mut inner = self.inner.lock();

        let roots = inner
            .assets
            .values()
            .filter(|asset| asset.parent.is_null())
            .map(|asset| asset.uuid)
            .collect::<Vec<_>>();

        let count_total = inner.assets.len();
        let mut count_removed = 0;

        for asset_id in roots {
            let asset = &inner.assets[&asset_id];
            if !self.file_system.exists(&asset_meta_file(&asset.path)) {
                count_removed += 1 + asset.children.len();
                self.remove_asset_locked(&mut inner, asset_id)?;
            }
        }

        info!(
            "reconciled assets removed={} preserved={}",
            count_removed,
            count_total - count_removed
        );
        Ok((count_removed, count_total - count_removed))
    }

    pub fn alloc_asset_uuid(&self) -> Uuid {
        let mut inner = self.inner.lock();
        self.gen_asset_uuid_locked(&mut inner)
    }

    pub fn gen_asset_uuids(&self, count: usize) -> Vec<Uuid> {
        let mut inner = self.inner.lock();
        (0..count)
            .map(|_| self.gen_asset_uuid_locked(&mut inner))
            .collect()
    }

    fn import_asset_locked(
        &self,
        inner: &mut AssetDbInner,
        flags: AssetFlags,
        importer: ClassTag,
        import_settings: TreeNode,
        import_result: AssetImportResult,
    ) -> Result<(), Error> {
        if inner.assets.contains_key(&import_result.main.uuid) {
            return Err(Error::InvalidState);
        }

        let main_uuid = import_result.main.uuid;
        let timestamp = import_result.timestamp;

        let mut children_uuid = Vec::with_capacity(import_result.children.len());
        for child in import_result.children {
            let artifacts = self.store_artifacts(child.artifacts)?;
            let asset = AssetData {
                uuid: child.uuid,
                path: child.path,
                flags: child.flags,
                parent: main_uuid,
                cls: child.cls,
                loader: child.loader,
                timestamp,
                artifacts,
                ..Default::default()
            };
            children_uuid.push(asset.uuid);
            self.add_asset_locked(inner, asset)?;
        }

        let main = import_result.main;

        let mut sources = Vec::with_capacity(import_result.sources.len());
        for source in &import_result.sources {
            sources.push(AssetSource {
                path: source.clone(),
                hash: self.file_system.hash_file(source)?,
                timestamp: self.file_system.file_timestamp(source)?,
            });
        }

        let artifacts = self.store_artifacts(main.artifacts)?;
        let asset = AssetData {
            uuid: main.uuid,
            path: main.path,
            cls: main.cls,
            loader: main.loader,
            importer,
            flags: flags | main.flags,
            parent: Uuid::NULL,
            children: children_uuid,
            deps: main.deps,
            sources,
            artifacts,
            import_settings,
            import_env: import_result.env,
            timestamp,
        };
        self.add_asset_locked(inner, asset)
    }

    fn store_artifacts(
        &self,
        artifacts: Vec<AssetImportArtifact>,
    ) -> Result<Vec<AssetArtifact>, Error> {
        let mut out = Vec::with_capacity(artifacts.len());
        for info in artifacts {
            let artifact_id = self.artifact_cache.add(info.object.as_ref(), &info.name)?;
            out.push(self.artifact_cache.get_info(artifact_id)?);
        }
        Ok(out)
    }

    fn add_asset_locked(&self, inner: &mut AssetDbInner, mut asset: AssetData) -> Result<(), Error> {
        let asset_id = asset.uuid;

        asset
            .import_env
            .file_to_id
            .insert(asset.path.clone(), asset_id);
        self.resolver.add(&asset.path, asset_id);
        inner.assets.insert(asset_id, asset);

        self.validate_asset_artifacts_locked(inner, asset_id)?;
        self.save_asset_meta_locked(inner, asset_id)?;
        Ok(())
    }

    fn create_asset_from_meta_locked(
        &self,
        inner: &mut AssetDbInner,
        asset_path: &str,
        asset_meta_data: AssetMetaData,
    ) -> Result<Uuid, Error> {
        let asset_id = if asset_meta_data.uuid.is_not_null() {
            asset_meta_data.uuid
        } else {
            self.gen_asset_uuid_locked(inner)
        };

        let asset = AssetData {
            uuid: asset_id,
            path: asset_path.to_owned(),
            cls: asset_meta_data.cls,
            flags: asset_meta_data.flags,
            importer: asset_meta_data.importer,
            import_env: asset_meta_data.import_env,
            import_settings: asset_meta_data.import_settings,
            ..Default::default()
        };
        self.add_asset_locked(inner, asset)?;
        Ok(asset_id)
    }

    fn create_asset_from_meta_path_locked(
        &self,
        inner: &mut AssetDbInner,
        asset_path: &str,
        skip_if_exists: bool,
    ) -> Result<Uuid, Error> {
        let meta = {
            let bytes = self.file_system.read_file(&asset_meta_file(asset_path))?;
            let text = String::from_utf8(bytes).map_err(|_| Error::FailedParse)?;
            AssetMetaData::tree_read(&self.context, &TreeNode::parse_yaml(&text)?)?
        };

        if meta.uuid.is_not_null() && inner.assets.contains_key(&meta.uuid) {
            if skip_if_exists {
                return Ok(meta.uuid);
            }
            self.remove_asset_locked(inner, meta.uuid)?;
        }

        self.create_asset_from_meta_locked(inner, asset_path, meta)
    }

    fn remove_asset_locked(&self, inner: &mut AssetDbInner, asset_id: Uuid) -> Result<(), Error> {
        if !inner.assets.contains_key(&asset_id) {
            return Err(Error::NoAsset);
        }

        loop {
            let child = match inner.assets[&asset_id].children.last() {
                Some(child) => *child,
                None => break,
            };
            self.remove_asset_locked(inner, child)?;
        }

        let (parent, path, artifacts) = {
            let asset = &inner.assets[&asset_id];
            (asset.parent, asset.path.clone(), asset.artifacts.clone())
        };

        if parent.is_not_null() {
            if let Some(parent_asset) = inner.assets.get_mut(&parent) {
                parent_asset.children.retain(|child| *child != asset_id);
            }
        }

        for artifact in &artifacts {
            self.artifact_cache.remove(artifact.uuid)?;
        }

        self.resolver.remove(&path);
        inner.assets.remove(&asset_id);
        Ok(())
    }

    fn validate_asset_artifacts_locked(
        &self,
        inner: &mut AssetDbInner,
        asset_id: Uuid,
    ) -> Result<(), Error> {
        let asset = inner.assets.get(&asset_id).ok_or(Error::NoAsset)?;

        let need_invalidation = asset
            .artifacts
            .iter()
            .any(|artifact| !self.artifact_cache.has(artifact.uuid));

        if need_invalidation {
            self.invalidate_asset_artifacts_locked(inner, asset_id)?;
        }
        Ok(())
    }

    fn invalidate_asset_artifacts_locked(
        &self,
        inner: &mut AssetDbInner,
        asset_id: Uuid,
    ) -> Result<(), Error> {
        let asset = inner.assets.get_mut(&asset_id).ok_or(Error::NoAsset)?;

        for artifact in &asset.artifacts {
            let _ = self.artifact_cache.remove(artifact.uuid);
        }
        asset.artifacts.clear();
        Ok(())
    }

    fn save_asset_meta_locked(&self, inner: &AssetDbInner, asset_id: Uuid) -> Result<(), Error> {
        let asset = inner.assets.get(&asset_id).ok_or(Error::NoAsset)?;

        let meta = asset_meta_of(asset);
        let mut node = TreeNode::default();
        meta.tree_write(&self.context, &mut node)?;
        self.file_system.save_file(
            &asset_meta_file(&asset.path),
            node.emit_yaml()?.as_bytes(),
        )
    }

    fn gen_asset_uuid_locked(&self, inner: &mut AssetDbInner) -> Uuid {
        loop {
            let id = Uuid::generate();
            if !inner.assets.contains_key(&id) && inner.reserved.insert(id) {
                return id;
            }
        }
    }
}

fn asset_meta_of(asset: &AssetData) -> AssetMetaData {
    AssetMetaData {
        uuid: asset.uuid,
        flags: asset.flags,
        cls: asset.cls.clone(),
        importer: asset.importer.clone(),
        import_env: asset.import_env.clone(),
        import_settings: asset.import_settings.clone(),
    }
}
