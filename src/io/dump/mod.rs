//! LAMMPS dump files.
//!
//! A dump is a sequence of frames. Each frame has a timestep, a particle count,
//! box bounds, and an `ITEM: ATOMS` table whose columns are described by a
//! [`DumpSchema`]. Frames are decoded lazily through [`Frames`].

mod reader;
mod schema;
mod writer;

pub use reader::{Frames, ReadOptions};
pub use schema::{Columns, DumpField, DumpSchema};
pub use writer::write;

use super::compression::{self, Compression};
use crate::error::Result;
use crate::model::snapshot::Snapshot;
use log::debug;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const TIMESTEP_MARKER: &str = "ITEM: TIMESTEP";

/// A dump file on disk, configured for reading.
///
/// ```no_run
/// use lammps_io::DumpFile;
///
/// let dump = DumpFile::open("traj.lammpstrj.gz").sort_ids(true);
/// for frame in dump.frames()? {
///     let frame = frame?;
///     println!("step {:?}: {} particles", frame.step, frame.len());
/// }
/// # Ok::<(), lammps_io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DumpFile {
    path: PathBuf,
    compression: Option<Compression>,
    options: ReadOptions,
}

impl DumpFile {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            compression: None,
            options: ReadOptions::default(),
        }
    }

    /// Column layout to use instead of the `ITEM: ATOMS` header.
    pub fn schema(mut self, schema: DumpSchema) -> Self {
        self.options.schema = Some(schema);
        self
    }

    pub fn sort_ids(mut self, sort: bool) -> Self {
        self.options.sort_ids = sort;
        self
    }

    /// Template whose fields fill in what each frame lacks.
    pub fn copy_from(mut self, template: Snapshot) -> Self {
        self.options.copy_from = Some(Arc::new(template));
        self
    }

    /// Overrides compression detection by extension.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Opens a fresh pass over the file.
    pub fn frames(&self) -> Result<Frames<Box<dyn BufRead + Send>>> {
        let reader = compression::open(&self.path, self.compression)?;
        Ok(Frames::new(reader, self.options.clone()))
    }

    /// Number of frames, found by scanning the whole file for timestep markers.
    ///
    /// This decompresses and reads every line, so it costs as much as a full
    /// pass without decoding the tables.
    pub fn frame_count(&self) -> Result<usize> {
        let reader = compression::open(&self.path, self.compression)?;
        let mut count = 0;
        for line in reader.lines() {
            if line?.trim() == TIMESTEP_MARKER {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Writes `snapshots` to `path` and returns a handle for reading them back.
    ///
    /// Compression follows the extension unless `compression` is given.
    pub fn create<'a, I>(
        path: impl AsRef<Path>,
        schema: &DumpSchema,
        snapshots: I,
        compression: Option<Compression>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Snapshot>,
    {
        let path = path.as_ref();
        let mut out = compression::create(path, compression)?;
        let frames = write(&mut out, schema, snapshots)?;
        out.finish()?;
        debug!("wrote {} frames to {}", frames, path.display());
        Ok(Self {
            path: path.to_path_buf(),
            compression,
            options: ReadOptions {
                schema: Some(schema.clone()),
                ..ReadOptions::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simbox::SimulationBox;
    use ndarray::array;

    fn frame(step: u64) -> Snapshot {
        let simbox = SimulationBox::new([0.0; 3], [10.0; 3]).unwrap();
        let mut snap = Snapshot::new(2, simbox, Some(step));
        snap.set_id(array![5, 2]).unwrap();
        snap.set_typeid(array![1, 2]).unwrap();
        snap.set_position(array![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]])
            .unwrap();
        snap
    }

    fn schema() -> DumpSchema {
        DumpSchema::new()
            .with_scalar(DumpField::Id, 0)
            .unwrap()
            .with_scalar(DumpField::TypeId, 1)
            .unwrap()
            .with_vector(DumpField::Position, [2, 3, 4])
            .unwrap()
    }

    #[test]
    fn create_then_count_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.lammpstrj");
        let frames = [frame(0), frame(100), frame(200)];
        let dump = DumpFile::create(&path, &schema(), &frames, None).unwrap();

        assert_eq!(dump.frame_count().unwrap(), 3);
        let read: Vec<Snapshot> = dump.frames().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[2].step, Some(200));
        // sorted by id on the way in
        assert_eq!(read[0].id_if_set().unwrap().to_vec(), vec![2, 5]);
        assert_eq!(read[0].typeid_if_set().unwrap().to_vec(), vec![2, 1]);
    }

    #[test]
    fn unsorted_read_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.lammpstrj");
        DumpFile::create(&path, &schema(), [&frame(0)], None).unwrap();

        let snap = DumpFile::open(&path)
            .sort_ids(false)
            .frames()
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(snap.id_if_set().unwrap().to_vec(), vec![5, 2]);
    }

    #[test]
    fn frames_can_be_iterated_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.lammpstrj.gz");
        let dump = DumpFile::create(&path, &schema(), [&frame(1), &frame(2)], None).unwrap();
        assert_eq!(dump.frames().unwrap().count(), 2);
        assert_eq!(dump.frames().unwrap().count(), 2);
    }
}
