use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Frame one event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "journal record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Reads `buf.len()` bytes, or reports a clean/torn end of file as `Ok(false)`.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Result of reading a journal back from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte offset of the first unreadable record, if the tail was torn or corrupt.
    pub discarded_from: Option<u64>,
}

/// Append-only booking journal.
///
/// Record layout: `[u32 LE: payload len][bincode Event][u32 LE: crc32 of payload]`.
/// A torn or corrupt tail (crash mid-write) is dropped on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffer one event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write the compacted journal next to the live one and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(compact_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live journal and reopen for append.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read every intact record. A missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        let mut offset: u64 = 0;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut payload)?
                || !read_frame_part(&mut reader, &mut crc_buf)?
                || u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload)
            {
                replay.discarded_from = Some(offset);
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => replay.events.push(event),
                Err(_) => {
                    replay.discarded_from = Some(offset);
                    break;
                }
            }
            offset += 8 + len as u64;
        }

        if let Some(at) = replay.discarded_from {
            tracing::warn!(
                "journal {}: discarding unreadable tail from byte {at}",
                path.display()
            );
        }
        Ok(replay)
    }
}

/// Cut the journal back to its last intact record so new appends are not
/// stranded behind an unreadable tail.
pub fn truncate_at(path: &Path, len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()
}

fn compact_path(path: &Path) -> PathBuf {
    path.with_extension("wal.tmp")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ulid::Ulid;

    use super::*;
    use crate::model::{BookingStatus, DateRange};

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("homestay_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn listing_created() -> Event {
        Event::ListingCreated {
            id: Ulid::new(),
            host_id: "host-1".into(),
            title: "Treehouse".into(),
            price_per_night: 90,
            max_guests: 2,
        }
    }

    fn booking_requested(listing_id: Ulid) -> Event {
        Event::BookingRequested {
            id: Ulid::new(),
            listing_id,
            guest_id: "guest-1".into(),
            range: DateRange::new("2024-06-01".parse().unwrap(), "2024-06-04".parse().unwrap()),
            guest_count: 2,
            total_price: 270,
            created_at: Utc::now(),
        }
    }

    fn append_all(wal: &mut Wal, events: &[Event]) {
        for e in events {
            wal.append_buffered(e).unwrap();
        }
        wal.flush_sync().unwrap();
    }

    #[test]
    fn missing_file_replays_empty() {
        let path = tmp_path("missing.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert!(replay.discarded_from.is_none());
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_replay.wal");
        let listing = listing_created();
        let events = vec![listing.clone(), booking_requested(listing.listing_id())];
        let mut wal = Wal::open(&path).unwrap();
        append_all(&mut wal, &events);
        assert_eq!(wal.appends_since_compact(), 2);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert!(replay.discarded_from.is_none());
    }

    #[test]
    fn torn_tail_is_discarded() {
        let path = tmp_path("torn_tail.wal");
        let first = listing_created();
        let mut wal = Wal::open(&path).unwrap();
        append_all(&mut wal, &[first.clone(), booking_requested(first.listing_id())]);
        drop(wal);

        let full = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first]);
        assert!(replay.discarded_from.is_some());
    }

    #[test]
    fn corrupt_crc_stops_replay() {
        let path = tmp_path("corrupt_crc.wal");
        let mut wal = Wal::open(&path).unwrap();
        append_all(&mut wal, &[listing_created()]);
        drop(wal);

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.discarded_from, Some(0));
    }

    #[test]
    fn compaction_replaces_history() {
        let path = tmp_path("compact.wal");
        let listing = listing_created();
        let listing_id = listing.listing_id();
        let booking = booking_requested(listing_id);
        let Event::BookingRequested { id, .. } = booking else { unreachable!() };

        let mut wal = Wal::open(&path).unwrap();
        append_all(
            &mut wal,
            &[
                listing.clone(),
                booking,
                Event::BookingStatusChanged {
                    id,
                    listing_id,
                    status: BookingStatus::Cancelled,
                    host_notes: None,
                },
                Event::BookingDeleted { id, listing_id },
            ],
        );

        Wal::write_compact_file(wal.path(), std::slice::from_ref(&listing)).unwrap();
        wal.swap_compact_file().unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![listing.clone()]);

        // Appends after the swap land in the new file.
        let next = listing_created();
        append_all(&mut wal, std::slice::from_ref(&next));
        assert_eq!(Wal::replay(&path).unwrap().events, vec![listing, next]);
    }

    #[test]
    fn appends_after_truncated_tail_survive() {
        let path = tmp_path("truncate_tail.wal");
        let first = listing_created();
        let mut wal = Wal::open(&path).unwrap();
        append_all(&mut wal, &[first.clone(), listing_created()]);
        drop(wal);

        let full = fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(full - 5).unwrap();

        let replay = Wal::replay(&path).unwrap();
        let at = replay.discarded_from.unwrap();
        truncate_at(&path, at).unwrap();

        let next = listing_created();
        let mut wal = Wal::open(&path).unwrap();
        append_all(&mut wal, std::slice::from_ref(&next));
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first, next]);
        assert!(replay.discarded_from.is_none());
    }
}
