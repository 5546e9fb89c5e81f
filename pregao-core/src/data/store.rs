//! Partitioned Parquet dataset on object storage, Hive-style.
//!
//! Layout: `{root}/dt={YYYY-MM-DD}/{content-hash}.snappy.parquet`
//!
//! The root is an `s3://bucket/prefix/` URI or a local directory. Writes use
//! overwrite-partition semantics: the new object is put first, then every
//! other object under the same `dt=` prefix is deleted. Partitions not being
//! written are never touched.
//!
//! `object_store` is async; each store owns a current-thread tokio runtime
//! and every public method here blocks until the I/O is done.

use super::clean::{Partition, PARTITION_KEY};
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use polars::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("object store: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("parquet I/O error: {0}")]
    Parquet(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    S3 { bucket: String, key: String },
    Local(PathBuf),
}

impl Location {
    /// `s3://bucket/key`, `file:///path` or a bare filesystem path.
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(StoreError::InvalidLocation {
                    location: uri.to_string(),
                    reason: "missing bucket name".into(),
                });
            }
            return Ok(Location::S3 {
                bucket: bucket.to_string(),
                key: key.trim_matches('/').to_string(),
            });
        }

        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Location::Local(PathBuf::from(path)));
        }

        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(StoreError::InvalidLocation {
                location: uri.to_string(),
                reason: format!("unsupported scheme '{scheme}'"),
            });
        }

        Ok(Location::Local(PathBuf::from(uri)))
    }
}

/// An object store driven synchronously.
pub struct BlockingStore {
    store: Arc<dyn ObjectStore>,
    runtime: tokio::runtime::Runtime,
}

impl BlockingStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { store, runtime })
    }

    /// Open the store behind `location` and return the object path it names.
    ///
    /// S3 credentials and region come from the usual `AWS_*` variables. Local
    /// paths must exist, since they are canonicalized.
    pub fn open(location: &Location) -> Result<(Self, ObjectPath), StoreError> {
        match location {
            Location::S3 { bucket, key } => {
                let s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?;
                Ok((Self::new(Arc::new(s3))?, ObjectPath::from(key.as_str())))
            }
            Location::Local(path) => {
                let object_path = ObjectPath::from_filesystem_path(path).map_err(|e| {
                    StoreError::InvalidLocation {
                        location: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((Self::new(Arc::new(LocalFileSystem::new()))?, object_path))
            }
        }
    }

    /// Every object below `prefix`, sorted by path.
    pub fn list(&self, prefix: &ObjectPath) -> Result<Vec<ObjectMeta>, StoreError> {
        let mut objects: Vec<ObjectMeta> = self
            .runtime
            .block_on(self.store.list(Some(prefix)).try_collect())?;
        objects.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(objects)
    }

    /// Immediate child "directories" of `prefix`.
    pub fn child_prefixes(&self, prefix: &ObjectPath) -> Result<Vec<ObjectPath>, StoreError> {
        let listing = self
            .runtime
            .block_on(self.store.list_with_delimiter(Some(prefix)))?;
        Ok(listing.common_prefixes)
    }

    pub fn get(&self, path: &ObjectPath) -> Result<Vec<u8>, StoreError> {
        let bytes = self.runtime.block_on(async {
            let result = self.store.get(path).await?;
            result.bytes().await
        })?;
        Ok(bytes.to_vec())
    }

    pub fn put(&self, path: &ObjectPath, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.runtime
            .block_on(self.store.put(path, PutPayload::from(bytes)))?;
        Ok(())
    }

    pub fn delete(&self, path: &ObjectPath) -> Result<(), StoreError> {
        self.runtime.block_on(self.store.delete(path))?;
        Ok(())
    }

    /// Read one Parquet object into a DataFrame.
    pub fn read_parquet(&self, path: &ObjectPath) -> Result<DataFrame, StoreError> {
        let bytes = self.get(path)?;
        Ok(ParquetReader::new(Cursor::new(bytes)).finish()?)
    }

    /// Read several Parquet objects and stack them in the given order.
    ///
    /// Column sets may differ between objects: the result carries the union
    /// of columns in first-seen order, null where an object lacks one.
    pub fn read_parquet_many(&self, paths: &[ObjectPath]) -> Result<DataFrame, StoreError> {
        let frames = paths
            .iter()
            .map(|p| self.read_parquet(p).map(IntoLazy::lazy))
            .collect::<Result<Vec<_>, _>>()?;
        if frames.is_empty() {
            return Ok(DataFrame::empty());
        }
        Ok(concat_lf_diagonal(frames, UnionArgs::default())?.collect()?)
    }
}

/// Result of writing one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionWrite {
    pub dt: NaiveDate,
    pub object: String,
    pub rows: usize,
    /// Objects from earlier writes that were removed.
    pub replaced: usize,
}

/// The `dt`-partitioned dataset.
pub struct DatasetStore {
    store: BlockingStore,
    root: ObjectPath,
    location: String,
}

impl DatasetStore {
    /// Open the dataset at `uri`. Local roots are created if missing.
    pub fn open(uri: &str) -> Result<Self, StoreError> {
        let location = Location::parse(uri)?;
        if let Location::Local(dir) = &location {
            std::fs::create_dir_all(dir)?;
        }
        let (store, root) = BlockingStore::open(&location)?;
        Ok(Self {
            store,
            root,
            location: uri.to_string(),
        })
    }

    /// Dataset rooted at a local directory.
    pub fn local(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(&dir.as_ref().display().to_string())
    }

    /// The URI this dataset was opened with.
    pub fn location(&self) -> &str {
        &self.location
    }

    fn partition_prefix(&self, dt: NaiveDate) -> ObjectPath {
        self.root
            .child(format!("{PARTITION_KEY}={}", dt.format("%Y-%m-%d")))
    }

    /// Replace the contents of one partition with `partition.frame`.
    pub fn write_partition(&self, partition: &Partition) -> Result<PartitionWrite, StoreError> {
        let mut frame = partition.frame.clone();
        let mut buf = Vec::new();
        ParquetWriter::new(&mut buf)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut frame)?;

        let hash = blake3::hash(&buf).to_hex();
        let prefix = self.partition_prefix(partition.dt);
        let object = prefix.child(format!("{}.snappy.parquet", &hash[..32]));

        let previous = self.store.list(&prefix)?;
        self.store.put(&object, buf)?;

        let mut replaced = 0;
        for meta in previous {
            if meta.location != object {
                self.store.delete(&meta.location)?;
                replaced += 1;
            }
        }

        tracing::debug!(
            partition = %partition.dt,
            object = %object,
            replaced,
            "partition written"
        );

        Ok(PartitionWrite {
            dt: partition.dt,
            object: object.to_string(),
            rows: frame.height(),
            replaced,
        })
    }

    /// Parquet objects currently in a partition.
    pub fn partition_objects(&self, dt: NaiveDate) -> Result<Vec<ObjectPath>, StoreError> {
        Ok(self
            .store
            .list(&self.partition_prefix(dt))?
            .into_iter()
            .map(|meta| meta.location)
            .filter(|p| p.as_ref().ends_with(".parquet"))
            .collect())
    }

    /// All rows of one partition.
    pub fn read_partition(&self, dt: NaiveDate) -> Result<DataFrame, StoreError> {
        let objects = self.partition_objects(dt)?;
        self.store.read_parquet_many(&objects)
    }

    /// Dates that have a `dt=` directory, ascending.
    pub fn partitions(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let key_prefix = format!("{PARTITION_KEY}=");
        let mut dates: Vec<NaiveDate> = self
            .store
            .child_prefixes(&self.root)?
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .filter_map(|name| {
                name.strip_prefix(&key_prefix)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            })
            .collect();
        dates.sort();
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn partition(dt: NaiveDate, cods: &[&str]) -> Partition {
        let days = dt
            .signed_duration_since(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            .num_days() as i32;
        let frame = DataFrame::new(vec![
            Column::new("cod".into(), cods.to_vec()),
            Column::new("dt".into(), vec![days; cods.len()])
                .cast(&DataType::Date)
                .unwrap(),
        ])
        .unwrap();
        Partition { dt, frame }
    }

    #[test]
    fn parse_locations() {
        assert_eq!(
            Location::parse("s3://bucket-bovespa/raw/").unwrap(),
            Location::S3 {
                bucket: "bucket-bovespa".into(),
                key: "raw".into()
            }
        );
        assert_eq!(
            Location::parse("s3://bucket").unwrap(),
            Location::S3 {
                bucket: "bucket".into(),
                key: String::new()
            }
        );
        assert_eq!(
            Location::parse("file:///tmp/lake").unwrap(),
            Location::Local(PathBuf::from("/tmp/lake"))
        );
        assert_eq!(
            Location::parse("lake/raw").unwrap(),
            Location::Local(PathBuf::from("lake/raw"))
        );
        assert!(Location::parse("s3:///raw").is_err());
        assert!(Location::parse("gs://bucket/raw").is_err());
    }

    #[test]
    fn write_creates_hive_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::local(dir.path()).unwrap();

        let write = store
            .write_partition(&partition(date(17), &["PETR4", "VALE3"]))
            .unwrap();
        assert_eq!(write.rows, 2);
        assert_eq!(write.replaced, 0);
        assert!(write.object.ends_with(".snappy.parquet"));

        let part_dir = dir.path().join("dt=2025-07-17");
        let files: Vec<_> = std::fs::read_dir(&part_dir).unwrap().collect();
        assert_eq!(files.len(), 1);

        let back = store.read_partition(date(17)).unwrap();
        assert_eq!(back.height(), 2);
        assert_eq!(back.column("dt").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn rewrite_replaces_only_its_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::local(dir.path()).unwrap();

        store.write_partition(&partition(date(16), &["ITUB4"])).unwrap();
        store
            .write_partition(&partition(date(17), &["PETR4", "VALE3"]))
            .unwrap();
        let second = store
            .write_partition(&partition(date(17), &["BBAS3"]))
            .unwrap();
        assert_eq!(second.replaced, 1);

        let day17 = store.read_partition(date(17)).unwrap();
        assert_eq!(day17.height(), 1);
        let cods = day17.column("cod").unwrap().str().unwrap();
        assert_eq!(cods.get(0), Some("BBAS3"));

        assert_eq!(store.read_partition(date(16)).unwrap().height(), 1);
        assert_eq!(store.partitions().unwrap(), vec![date(16), date(17)]);
    }

    #[test]
    fn empty_dataset_has_no_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::local(dir.path().join("lake")).unwrap();

        assert!(store.partitions().unwrap().is_empty());
        assert_eq!(store.read_partition(date(17)).unwrap().height(), 0);
    }
}
