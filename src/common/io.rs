//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};
use tempfile::{NamedTempFile, TempPath};

/// Whether `path` names a gzip (or bgzip) compressed file by its extension.
fn is_gz_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("gz") | Some("bgz")
    )
}

/// Transparently open a file with gzip decoder, `-` is stdin.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref() == Path::new("-") {
        tracing::trace!("Reading from stdin");
        Ok(Box::new(BufReader::new(std::io::stdin())))
    } else if is_gz_path(path.as_ref()) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let file = File::open(path)?;
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

enum Sink {
    Stdout(BufWriter<std::io::Stdout>),
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

/// Output file that only appears at its destination once `finish` succeeds.
///
/// Data is written to a temporary file next to the destination which is renamed
/// into place on `finish`; dropping the writer without finishing removes the
/// temporary file.
pub struct AtomicWriter {
    sink: Sink,
    target: Option<(TempPath, PathBuf)>,
}

impl AtomicWriter {
    /// Flush all data and move the output into place.
    pub fn finish(self) -> Result<(), anyhow::Error> {
        match self.sink {
            Sink::Stdout(mut w) => w.flush()?,
            Sink::Plain(mut w) => w.flush()?,
            Sink::Gz(w) => w.finish()?.flush()?,
        }
        if let Some((temp_path, path)) = self.target {
            tracing::trace!("Moving output into place at {:?}", &path);
            temp_path
                .persist(&path)
                .map_err(|e| anyhow::anyhow!("could not move output to {:?}: {}", &path, e))?;
        }
        Ok(())
    }
}

impl Write for AtomicWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.sink {
            Sink::Stdout(w) => w.write(buf),
            Sink::Plain(w) => w.write(buf),
            Sink::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.sink {
            Sink::Stdout(w) => w.flush(),
            Sink::Plain(w) => w.flush(),
            Sink::Gz(w) => w.flush(),
        }
    }
}

/// Transparently open a file with gzip encoder for atomic writing, `-` is stdout.
pub fn open_write_maybe_gz<P>(path: P) -> Result<AtomicWriter, anyhow::Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if path == Path::new("-") {
        tracing::trace!("Writing to stdout");
        return Ok(AtomicWriter {
            sink: Sink::Stdout(BufWriter::new(std::io::stdout())),
            target: None,
        });
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let (file, temp_path) = NamedTempFile::new_in(&dir)
        .map_err(|e| anyhow::anyhow!("could not create temporary file in {:?}: {}", &dir, e))?
        .into_parts();
    let sink = if is_gz_path(path) {
        tracing::trace!("Opening {:?} as gzip for writing", path);
        Sink::Gz(GzEncoder::new(BufWriter::new(file), Compression::default()))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path);
        Sink::Plain(BufWriter::new(file))
    };

    Ok(AtomicWriter {
        sink,
        target: Some((temp_path, path.to_path_buf())),
    })
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("test.txt")]
    #[case("test.txt.gz")]
    fn write_then_read_maybe_gz(#[case] filename: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join(filename);

        {
            let mut f = super::open_write_maybe_gz(&path)?;
            f.write_all(b"1\t10\t0.5\n")?;
            f.finish()?;
        }

        let mut buf = String::new();
        super::open_read_maybe_gz(&path)?.read_to_string(&mut buf)?;
        assert_eq!(buf, "1\t10\t0.5\n");

        Ok(())
    }

    #[test]
    fn unfinished_output_leaves_no_file() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("out.tsv");

        {
            let mut f = super::open_write_maybe_gz(&path)?;
            f.write_all(b"partial")?;
        }

        assert!(!path.exists());

        Ok(())
    }
}
