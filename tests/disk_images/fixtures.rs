//! Hand-built volumes for the formats the engine cannot write

use a2vault_rs::prelude::*;
use chrono::{NaiveDate, NaiveDateTime};

pub(crate) fn stamp() -> NaiveDateTime {
	NaiveDate::from_ymd_opt(1988, 4, 1).unwrap().and_hms_opt(9, 30, 0).unwrap()
}

fn dos_sector(image: &mut [u8], track: usize, sector: usize) -> &mut [u8] {
	let offset = (track * 16 + sector) * 256;
	&mut image[offset..offset + 256]
}

/// DOS-order 140K disk holding `HELLO` (Applesoft, 3 bytes) and `README` (text)
pub(crate) fn dos_disk() -> Vec<u8> {
	let mut image = vec![0u8; FLOPPY_140K];

	let vtoc = dos_sector(&mut image, 17, 0);
	vtoc[0x01] = 17;
	vtoc[0x02] = 15;
	vtoc[0x03] = 3;
	vtoc[0x06] = 1;
	vtoc[0x27] = 122;
	vtoc[0x34] = 35;
	vtoc[0x35] = 16;

	// HELLO: list at 18/0, data at 18/1
	dos_sector(&mut image, 18, 0)[0x0C..0x0E].copy_from_slice(&[18, 1]);
	dos_sector(&mut image, 18, 1)[..5].copy_from_slice(&[3, 0, 0xBA, 0xD5, 0x00]);
	// README: list at 19/0, data at 19/1
	dos_sector(&mut image, 19, 0)[0x0C..0x0E].copy_from_slice(&[19, 1]);
	dos_sector(&mut image, 19, 1)[..12].copy_from_slice(b"HELLO WORLD\r");

	let catalog = dos_sector(&mut image, 17, 15);
	for (slot, (list_track, type_byte, name)) in [(18u8, 0x02u8, "HELLO"), (19, 0x80, "README")].into_iter().enumerate() {
		let entry = &mut catalog[0x0B + slot * 35..0x0B + (slot + 1) * 35];
		entry[0] = list_track;
		entry[1] = 0;
		entry[2] = type_byte;
		for (i, byte) in entry[3..33].iter_mut().enumerate() {
			*byte = name.as_bytes().get(i).copied().unwrap_or(b' ') | 0x80;
		}
		entry[0x21] = 2;
	}
	image
}

/// Linear 280-block UCSD Pascal volume holding one CODE file
pub(crate) fn pascal_disk() -> Vec<u8> {
	let mut image = vec![0u8; FLOPPY_140K];
	let directory = &mut image[2 * BLOCK_SIZE..];

	directory[2] = 6;
	directory[6] = 5;
	directory[7..12].copy_from_slice(b"APPLE");
	directory[0x0E..0x10].copy_from_slice(&280u16.to_le_bytes());
	directory[0x10] = 1;

	let entry = &mut directory[26..52];
	entry[0] = 6;
	entry[2] = 8;
	entry[4] = 2;
	entry[6] = 11;
	entry[7..18].copy_from_slice(b"SYSTEM.CODE");
	entry[0x16..0x18].copy_from_slice(&300u16.to_le_bytes());

	image[6 * BLOCK_SIZE..8 * BLOCK_SIZE].fill(0x60);
	image
}

/// Copies every block of `image` from one physical order to the other
pub(crate) fn reorder(image: &[u8], from: Addressing, to: Addressing) -> Vec<u8> {
	let mut reordered = vec![0u8; image.len()];
	for index in 0..Addressing::block_count(image.len()) {
		let block = from.read_block(image, index).unwrap();
		to.write_block(&mut reordered, index, &block).unwrap();
	}
	reordered
}
