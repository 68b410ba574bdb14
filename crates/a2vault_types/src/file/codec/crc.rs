//! CRC-16/XMODEM (polynomial 0x1021, MSB-first, no reflection, no final XOR).
//!
//! `NuFX` uses it everywhere with different seeds: master and record headers and
//! LZW/1 payloads are seeded with 0, version 3 thread CRCs with 0xFFFF.

/// Generator polynomial
const POLYNOMIAL: u16 = 0x1021;

/// Byte-at-a-time lookup table, built at compile time
const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
	let mut table = [0u16; 256];
	let mut i = 0;
	while i < 256 {
		let mut crc = (i as u16) << 8;
		let mut bit = 0;
		while bit < 8 {
			crc = if crc & 0x8000 != 0 {
				(crc << 1) ^ POLYNOMIAL
			} else {
				crc << 1
			};
			bit += 1;
		}
		table[i] = crc;
		i += 1;
	}
	table
}

/// Continues a CRC-16/XMODEM computation from `seed` over `data`
pub fn crc16(seed: u16, data: &[u8]) -> u16 {
	data.iter().fold(seed, |crc, &byte| {
		(crc << 8) ^ TABLE[usize::from((crc >> 8) as u8 ^ byte)]
	})
}

/// Computes CRC-16/XMODEM of `data` with the standard zero seed
pub fn crc16_xmodem(data: &[u8]) -> u16 {
	crc16(0, data)
}

/// A stored CRC together with the value computed over the data it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CrcCheck {
	/// CRC read from the file
	pub stored: u16,
	/// CRC computed while reading
	pub computed: u16,
}

impl CrcCheck {
	/// Returns `true` if the stored and computed values agree
	pub fn is_valid(&self) -> bool {
		self.stored == self.computed
	}
}
