use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::event::ProfileRecord;

/// Appends newline-delimited JSON profile records to a file, matching the
/// design doc's "one profile record per class per sampling interval"
/// contract (§6).
///
/// A plain `Mutex<BufWriter<File>>` rather than an async writer: records are
/// small, emission is infrequent (one per class per sampling tick), and
/// every caller already holds a synchronous context (a `tracing` event
/// handler or a periodic sampler tick).
pub struct ProfileWriter {
    out: Mutex<BufWriter<File>>,
}

impl ProfileWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn write_record(&self, record: &ProfileRecord) -> io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut out = self.out.lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{OhlcRecord, ProfileEvent};
    use dataflow_common::HostRank;
    use std::io::{BufRead, BufReader};

    #[test]
    fn appends_one_json_line_per_record() {
        let dir = tempdir::TempDir::new("profiler-writer-test").unwrap();
        let path = dir.path().join("profile.jsonl");
        let writer = ProfileWriter::create(&path).unwrap();

        writer
            .write_record(&ProfileRecord {
                ts_micros: 42,
                host_rank: HostRank(0),
                event: ProfileEvent::MemProfile {
                    total: OhlcRecord::default(),
                    float: OhlcRecord::default(),
                    base: OhlcRecord::default(),
                },
            })
            .unwrap();
        writer
            .write_record(&ProfileRecord {
                ts_micros: 43,
                host_rank: HostRank(0),
                event: ProfileEvent::Cmdline {
                    event: "start",
                    program: "dataflow-engine".into(),
                    argv: vec!["--workers".into(), "4".into()],
                },
            })
            .unwrap();

        let lines: Vec<String> = BufReader::new(File::open(&path).unwrap())
            .lines()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"class\":\"MemProfile\""));
        assert!(lines[1].contains("\"class\":\"Cmdline\""));
    }
}
