//! DOS 3.3 volume support (read-only).
//!
//! ## Layout
//!
//! 35 tracks of 16 sectors of 256 bytes. The VTOC at track 17, sector 0 holds
//! the geometry and the location of the first catalog sector:
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | 0x01   | 2    | First catalog track/sector             |
//! | 0x06   | 1    | Volume number                          |
//! | 0x27   | 1    | Track/sector pairs per list sector (122) |
//! | 0x34   | 1    | Tracks per disk                        |
//! | 0x35   | 1    | Sectors per track                      |
//!
//! Catalog sectors form a linked list (link at 0x01) and hold seven 35-byte
//! entries from offset 0x0B:
//!
//! | Offset | Size | Field                                      |
//! |--------|------|--------------------------------------------|
//! | 0x00   | 2    | Track/sector list location (0xFF = deleted, 0 = unused) |
//! | 0x02   | 1    | Type; bit 7 = locked                       |
//! | 0x03   | 30   | Name, high bit set, space padded           |
//! | 0x21   | 2    | Sectors used                               |
//!
//! A track/sector list sector links to the next one at 0x01 and holds up to
//! 122 data sector pairs from 0x0C; track 0 ends the list.

use std::{collections::HashSet, fmt::Display};

use crate::file::{
	A2FileError, Addressing, Catalog, CatalogEntry, Diagnostics, DiskFormat, EntryContents, FormatKind,
	ReadOptions, SECTOR_SIZE, Sector, bytes::u16_at,
};

const KIND: FormatKind = FormatKind::Dos33;

/// DOS 3.3 constants
pub mod constants {
	/// Track holding the VTOC
	pub const VTOC_TRACK: usize = 17;

	/// Sector holding the VTOC
	pub const VTOC_SECTOR: usize = 0;

	/// Track/sector pairs per list sector
	pub const PAIRS_PER_LIST: usize = 122;

	/// Offset of the first pair in a list sector
	pub const FIRST_PAIR_OFFSET: usize = 0x0C;

	/// Offset of the first entry in a catalog sector
	pub const FIRST_ENTRY_OFFSET: usize = 0x0B;

	/// Size of a catalog entry
	pub const ENTRY_SIZE: usize = 35;

	/// Catalog entries per sector
	pub const ENTRIES_PER_SECTOR: usize = 7;

	/// Length of the name field
	pub const NAME_LEN: usize = 30;

	/// Track byte of a deleted entry
	pub const DELETED: u8 = 0xFF;

	/// Standard number of tracks
	pub const TRACKS: usize = 35;

	/// Sectors per track
	pub const SECTORS: usize = 16;
}

use constants::*;

/// DOS 3.3 file type (low seven bits of the type byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
	/// `T`: sequential or random access text
	Text,
	/// `I`: Integer BASIC program
	Integer,
	/// `A`: Applesoft BASIC program
	Applesoft,
	/// `B`: binary image
	Binary,
	/// `S`: special
	Special,
	/// `R`: relocatable object
	Relocatable,
	/// New `A` type
	NewA,
	/// New `B` type
	NewB,
	/// Unrecognized bits
	Unknown(u8),
}

impl From<u8> for FileKind {
	fn from(value: u8) -> Self {
		match value & 0x7F {
			0x00 => FileKind::Text,
			0x01 => FileKind::Integer,
			0x02 => FileKind::Applesoft,
			0x04 => FileKind::Binary,
			0x08 => FileKind::Special,
			0x10 => FileKind::Relocatable,
			0x20 => FileKind::NewA,
			0x40 => FileKind::NewB,
			other => FileKind::Unknown(other),
		}
	}
}

impl Display for FileKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let letter = match self {
			FileKind::Text => "T",
			FileKind::Integer => "I",
			FileKind::Applesoft => "A",
			FileKind::Binary => "B",
			FileKind::Special => "S",
			FileKind::Relocatable => "R",
			FileKind::NewA => "a",
			FileKind::NewB => "b",
			FileKind::Unknown(_) => "?",
		};
		write!(f, "{}", letter)
	}
}

/// Volume Table Of Contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vtoc {
	/// First catalog track
	pub catalog_track: u8,
	/// First catalog sector
	pub catalog_sector: u8,
	/// Volume number
	pub volume: u8,
	/// Tracks on the disk
	pub tracks: u8,
	/// Sectors per track
	pub sectors: u8,
}

impl Vtoc {
	/// Parses and validates a VTOC sector
	pub fn from_bytes(sector: &Sector) -> Result<Self, A2FileError> {
		let vtoc = Self {
			catalog_track: sector[0x01],
			catalog_sector: sector[0x02],
			volume: sector[0x06],
			tracks: sector[0x34],
			sectors: sector[0x35],
		};

		let plausible = usize::from(sector[0x27]) == PAIRS_PER_LIST
			&& usize::from(vtoc.sectors) == SECTORS
			&& vtoc.tracks > 0
			&& vtoc.catalog_track > 0
			&& vtoc.catalog_track < vtoc.tracks
			&& usize::from(vtoc.catalog_sector) < SECTORS;
		if !plausible {
			return Err(A2FileError::invalid_magic(
				KIND,
				&[PAIRS_PER_LIST as u8, SECTORS as u8],
				&[sector[0x27], sector[0x35]],
			));
		}
		Ok(vtoc)
	}

	/// Volume name shown for the disk
	pub fn volume_name(&self) -> String {
		format!("DOS 3.3 VOLUME {:03}", self.volume)
	}
}

/// A live catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
	/// Track of the first track/sector list sector
	pub list_track: u8,
	/// Sector of the first track/sector list sector
	pub list_sector: u8,
	/// Raw type byte
	pub type_byte: u8,
	/// Name with the high bits stripped and padding removed
	pub name: String,
	/// Sectors used, list sectors included
	pub sectors_used: u16,
}

impl CatalogRecord {
	/// Parses a 35-byte entry; `None` for deleted entries
	fn from_bytes(entry: &[u8]) -> Option<Self> {
		if entry[0] == DELETED {
			return None;
		}
		let name: String = entry[3..3 + NAME_LEN].iter().map(|&b| char::from(b & 0x7F)).collect();
		Some(Self {
			list_track: entry[0],
			list_sector: entry[1],
			type_byte: entry[2],
			name: name.trim_end().to_string(),
			sectors_used: u16_at(entry, 0x21),
		})
	}

	/// File type
	pub fn kind(&self) -> FileKind {
		FileKind::from(self.type_byte)
	}

	/// Write protected
	pub fn locked(&self) -> bool {
		self.type_byte & 0x80 != 0
	}
}

/// Sector reader bound to one volume
struct Volume<'a> {
	buffer: &'a [u8],
	addressing: Addressing,
	vtoc: Vtoc,
}

impl Volume<'_> {
	fn total_sectors(&self) -> usize {
		usize::from(self.vtoc.tracks) * SECTORS
	}

	fn sector(&self, track: u8, sector: u8) -> Option<Sector> {
		if track >= self.vtoc.tracks || usize::from(sector) >= SECTORS {
			return None;
		}
		self.addressing.read_sector(self.buffer, usize::from(track), usize::from(sector))
	}

	/// Walks the catalog chain, collecting live entries
	fn catalog(&self, diagnostics: &mut Diagnostics) -> Vec<CatalogRecord> {
		let mut records = Vec::new();
		let mut visited = HashSet::new();
		let mut link = (self.vtoc.catalog_track, self.vtoc.catalog_sector);

		'chain: while link.0 != 0 {
			if !visited.insert(link) || visited.len() > self.total_sectors() {
				diagnostics.warn(KIND, format!("catalog chain revisits track {} sector {}", link.0, link.1));
				break;
			}
			let Some(sector) = self.sector(link.0, link.1) else {
				diagnostics.warn(KIND, format!("catalog link to track {} sector {} is invalid", link.0, link.1));
				break;
			};

			for slot in 0..ENTRIES_PER_SECTOR {
				let offset = FIRST_ENTRY_OFFSET + slot * ENTRY_SIZE;
				let entry = &sector[offset..offset + ENTRY_SIZE];
				if entry[0] == 0 {
					break 'chain;
				}
				if let Some(record) = CatalogRecord::from_bytes(entry) {
					records.push(record);
				}
			}
			link = (sector[1], sector[2]);
		}
		records
	}

	/// Collects the data sectors of a file in order
	fn file_data(&self, record: &CatalogRecord, diagnostics: &mut Diagnostics) -> Result<Vec<u8>, A2FileError> {
		let mut data = Vec::new();
		let mut visited = HashSet::new();
		let mut link = (record.list_track, record.list_sector);

		'chain: while link.0 != 0 {
			if !visited.insert(link) || visited.len() > self.total_sectors() {
				diagnostics.warn(KIND, format!("'{}': track/sector list loops", record.name));
				break;
			}
			let list = self.sector(link.0, link.1).ok_or_else(|| {
				A2FileError::structural(
					KIND,
					format!("track/sector list at track {} sector {} is out of range", link.0, link.1),
				)
			})?;

			for pair in 0..PAIRS_PER_LIST {
				let offset = FIRST_PAIR_OFFSET + pair * 2;
				let (track, sector) = (list[offset], list[offset + 1]);
				if track == 0 {
					break 'chain;
				}
				let payload = self.sector(track, sector).ok_or_else(|| {
					A2FileError::structural(
						KIND,
						format!("data sector at track {} sector {} is out of range", track, sector),
					)
				})?;
				data.extend_from_slice(&payload);
			}
			link = (list[1], list[2]);
		}
		Ok(data)
	}

	/// Number of entries whose first track/sector list looks well formed
	fn plausibility(&self) -> usize {
		self.catalog(&mut Diagnostics::new())
			.iter()
			.filter(|record| {
				self.sector(record.list_track, record.list_sector).is_some_and(|list| {
					let (track, sector) = (list[FIRST_PAIR_OFFSET], list[FIRST_PAIR_OFFSET + 1]);
					list[0] == 0 && track != 0 && track < self.vtoc.tracks && usize::from(sector) < SECTORS
				})
			})
			.count()
	}
}

/// Removes the per-type headers from raw sector data
///
/// Returns the payload and the auxiliary type (load address for binaries).
pub fn trim_payload(kind: FileKind, raw: &[u8]) -> (Vec<u8>, u16) {
	let length_prefixed = |header: usize| {
		if raw.len() < header {
			return Vec::new();
		}
		let declared = usize::from(u16_at(raw, header - 2));
		raw[header..raw.len().min(header + declared)].to_vec()
	};

	match kind {
		FileKind::Binary => {
			let address = if raw.len() >= 2 { u16_at(raw, 0) } else { 0 };
			(length_prefixed(4), address)
		}
		FileKind::Applesoft | FileKind::Integer => (length_prefixed(2), 0),
		FileKind::Text => {
			let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
			(raw[..end].to_vec(), 0)
		}
		_ => (raw.to_vec(), 0),
	}
}

/// Reads the VTOC under `addressing`
fn open(buffer: &[u8], addressing: Addressing) -> Result<Volume<'_>, A2FileError> {
	let sector = addressing
		.read_sector(buffer, VTOC_TRACK, VTOC_SECTOR)
		.ok_or_else(|| A2FileError::insufficient_data(KIND, (VTOC_TRACK * SECTORS + 1) * SECTOR_SIZE, buffer.len()))?;
	let vtoc = Vtoc::from_bytes(&sector)?;
	Ok(Volume {
		buffer,
		addressing,
		vtoc,
	})
}

/// Parses a DOS 3.3 volume with default options
pub fn read_catalog(buffer: &[u8]) -> Result<Catalog, A2FileError> {
	read_catalog_with(buffer, &ReadOptions::default())
}

/// Parses a DOS 3.3 volume
///
/// The VTOC sits at the same offset in both sector orders, so the order whose
/// catalog points at well formed track/sector lists wins; DOS order on a tie.
pub fn read_catalog_with(buffer: &[u8], _options: &ReadOptions) -> Result<Catalog, A2FileError> {
	let dos_order = open(buffer, Addressing::Interleaved)?;
	let prodos_order = open(buffer, Addressing::Linear)?;
	let volume = if prodos_order.plausibility() > dos_order.plausibility() {
		prodos_order
	} else {
		dos_order
	};

	let mut diagnostics = Diagnostics::new();
	if volume.addressing == Addressing::Linear {
		diagnostics.info(KIND, "sectors are in ProDOS order");
	}

	let mut entries = Vec::new();
	for record in volume.catalog(&mut diagnostics) {
		let raw = match volume.file_data(&record, &mut diagnostics) {
			Ok(raw) => raw,
			Err(e) => {
				diagnostics.warn(KIND, format!("skipping '{}': {}", record.name, e));
				continue;
			}
		};
		let (data, aux_type) = trim_payload(record.kind(), &raw);

		entries.push(CatalogEntry {
			name: record.name.clone(),
			file_type: record.type_byte & 0x7F,
			aux_type,
			size: data.len(),
			blocks_used: usize::from(record.sectors_used).div_ceil(2),
			key_block: usize::from(record.list_track) * SECTORS + usize::from(record.list_sector),
			storage_type: 0,
			locked: record.locked(),
			created: None,
			modified: None,
			contents: EntryContents::File {
				data,
				resource_fork: None,
			},
		});
	}

	Ok(Catalog {
		disk_name: volume.vtoc.volume_name(),
		disk_format: DiskFormat::Dos33,
		disk_size: buffer.len(),
		addressing: volume.addressing,
		entries,
		diagnostics,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::file::FLOPPY_140K;

	/// Builds DOS-order disks sector by sector
	struct DiskBuilder {
		image: Vec<u8>,
		next_free: (u8, u8),
		catalog: Vec<(u8, u8)>,
		entries: usize,
	}

	impl DiskBuilder {
		fn new(volume: u8) -> Self {
			let mut builder = Self {
				image: vec![0u8; FLOPPY_140K],
				next_free: (18, 0),
				catalog: (1..=15u8).rev().map(|s| (17, s)).collect(),
				entries: 0,
			};
			let vtoc = builder.sector_mut(17, 0);
			vtoc[0x01] = 17;
			vtoc[0x02] = 15;
			vtoc[0x03] = 3;
			vtoc[0x06] = volume;
			vtoc[0x27] = 122;
			vtoc[0x34] = 35;
			vtoc[0x35] = 16;
			for s in (2..=15u8).rev() {
				let sector = builder.sector_mut(17, s);
				sector[1] = 17;
				sector[2] = s - 1;
			}
			builder
		}

		fn sector_mut(&mut self, track: u8, sector: u8) -> &mut [u8] {
			let offset = (usize::from(track) * 16 + usize::from(sector)) * SECTOR_SIZE;
			&mut self.image[offset..offset + SECTOR_SIZE]
		}

		fn allocate(&mut self) -> (u8, u8) {
			let allocated = self.next_free;
			self.next_free = if allocated.1 == 15 {
				(allocated.0 + 1, 0)
			} else {
				(allocated.0, allocated.1 + 1)
			};
			allocated
		}

		/// Adds a file whose raw sector contents are `raw`
		fn add(&mut self, name: &str, type_byte: u8, raw: &[u8]) -> (u8, u8) {
			let list = self.allocate();
			let chunks: Vec<&[u8]> = raw.chunks(SECTOR_SIZE).collect();
			let mut pairs = Vec::new();
			for chunk in &chunks {
				let ts = self.allocate();
				self.sector_mut(ts.0, ts.1)[..chunk.len()].copy_from_slice(chunk);
				pairs.push(ts);
			}
			let list_sector = self.sector_mut(list.0, list.1);
			for (i, (t, s)) in pairs.iter().enumerate() {
				list_sector[0x0C + i * 2] = *t;
				list_sector[0x0C + i * 2 + 1] = *s;
			}

			let (cat_track, cat_sector) = self.catalog[self.entries / 7];
			let offset = 0x0B + (self.entries % 7) * 35;
			self.entries += 1;
			let sectors_used = (pairs.len() + 1) as u16;
			let entry = &mut self.sector_mut(cat_track, cat_sector)[offset..offset + 35];
			entry[0] = list.0;
			entry[1] = list.1;
			entry[2] = type_byte;
			for (i, slot) in entry[3..33].iter_mut().enumerate() {
				*slot = name.as_bytes().get(i).copied().unwrap_or(b' ') | 0x80;
			}
			entry[0x21..0x23].copy_from_slice(&sectors_used.to_le_bytes());
			list
		}
	}

	fn binary(address: u16, body: &[u8]) -> Vec<u8> {
		let mut raw = address.to_le_bytes().to_vec();
		raw.extend_from_slice(&(body.len() as u16).to_le_bytes());
		raw.extend_from_slice(body);
		raw
	}

	fn sample_disk() -> DiskBuilder {
		let mut disk = DiskBuilder::new(254);
		disk.add("HELLO", 0x02, &[0x05, 0x00, 0xAA, 0xBB, 0xCC, 0x00, 0x00]);
		disk.add("LOADER", 0x84, &binary(0x0800, &[0xEA; 600]));
		disk.add("NOTES", 0x00, b"LINE ONE\rLINE TWO\r\0\0garbage");
		disk
	}

	#[test]
	fn test_read_catalog() {
		let disk = sample_disk();
		let catalog = read_catalog(&disk.image).unwrap();
		assert_eq!(catalog.disk_name, "DOS 3.3 VOLUME 254");
		assert_eq!(catalog.disk_format, DiskFormat::Dos33);
		assert_eq!(catalog.addressing, Addressing::Interleaved);

		let names: Vec<&str> = catalog.entries.iter().map(|e| e.name.as_str()).collect();
		assert_eq!(names, ["HELLO", "LOADER", "NOTES"]);

		let hello = &catalog.entries[0];
		assert_eq!(hello.data(), Some(&[0xAA, 0xBB, 0xCC, 0x00, 0x00][..]));
		assert!(!hello.locked);

		let loader = &catalog.entries[1];
		assert!(loader.locked);
		assert_eq!(loader.file_type, 0x04);
		assert_eq!(loader.aux_type, 0x0800);
		assert_eq!(loader.size, 600);
		assert_eq!(loader.blocks_used, 2);

		let notes = &catalog.entries[2];
		assert_eq!(notes.data(), Some(&b"LINE ONE\rLINE TWO\r"[..]));
	}

	#[test]
	fn test_deleted_entries_skipped() {
		let mut disk = sample_disk();
		let entry = &mut disk.sector_mut(17, 15)[0x0B + 35..0x0B + 70];
		entry[0] = DELETED;
		let catalog = read_catalog(&disk.image).unwrap();
		let names: Vec<&str> = catalog.entries.iter().map(|e| e.name.as_str()).collect();
		assert_eq!(names, ["HELLO", "NOTES"]);
	}

	#[test]
	fn test_catalog_spanning_sectors() {
		let mut disk = DiskBuilder::new(1);
		for i in 0..20 {
			disk.add(&format!("FILE{}", i), 0x04, &binary(0x2000, &[i as u8; 10]));
		}
		let catalog = read_catalog(&disk.image).unwrap();
		assert_eq!(catalog.entries.len(), 20);
		assert_eq!(catalog.entries[19].data(), Some(&[19u8; 10][..]));
	}

	#[test]
	fn test_cyclic_catalog_terminates() {
		let mut disk = sample_disk();
		// Fill the first sector so the walk does not stop on an unused entry
		for i in 3..7 {
			disk.add(&format!("X{}", i), 0x04, &binary(0, &[1]));
		}
		let first = disk.sector_mut(17, 15);
		first[1] = 17;
		first[2] = 15;

		let catalog = read_catalog(&disk.image).unwrap();
		assert_eq!(catalog.entries.len(), 7);
		assert_eq!(catalog.diagnostics.warning_count(), 1);
	}

	#[test]
	fn test_cyclic_track_sector_list() {
		let mut disk = DiskBuilder::new(1);
		let list = disk.add("LOOPY", 0x04, &binary(0x300, &[7; 10]));
		let sector = disk.sector_mut(list.0, list.1);
		let data = (sector[0x0C], sector[0x0D]);
		// A full list so the walk reaches the link, which points back at itself
		for pair in sector[0x0C..0x0C + 2 * 122].chunks_mut(2) {
			pair.copy_from_slice(&[data.0, data.1]);
		}
		sector[1] = list.0;
		sector[2] = list.1;

		let catalog = read_catalog(&disk.image).unwrap();
		assert_eq!(catalog.entries[0].data(), Some(&[7u8; 10][..]));
		assert_eq!(catalog.diagnostics.warning_count(), 1);
	}

	#[test]
	fn test_prodos_order_image() {
		let disk = sample_disk();
		let mut reordered = vec![0u8; FLOPPY_140K];
		for block in 0..280 {
			let data = Addressing::Interleaved.read_block(&disk.image, block).unwrap();
			Addressing::Linear.write_block(&mut reordered, block, &data).unwrap();
		}

		let catalog = read_catalog(&reordered).unwrap();
		assert_eq!(catalog.addressing, Addressing::Linear);
		assert_eq!(catalog.entries.len(), 3);
		assert_eq!(catalog.entries[1].size, 600);
	}

	#[test]
	fn test_not_dos() {
		assert!(read_catalog(&vec![0u8; FLOPPY_140K]).is_err());
		assert!(read_catalog(&[0u8; 512]).is_err());
	}

	#[test]
	fn test_trim_payload_bounds() {
		// Declared length past the end of the data is clamped
		let (data, address) = trim_payload(FileKind::Binary, &[0x00, 0x20, 0xFF, 0x00, 1, 2]);
		assert_eq!(data, [1, 2]);
		assert_eq!(address, 0x2000);
		assert!(trim_payload(FileKind::Applesoft, &[1]).0.is_empty());
		assert_eq!(FileKind::from(0x84).to_string(), "B");
	}
}
