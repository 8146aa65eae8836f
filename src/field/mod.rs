//! Bit-level building blocks shared by the SPD and XMP codecs.

use core::fmt::{self, Write};

use thiserror::Error;


/// Units of the medium time base per nanosecond (1 MTB = 0.125 ns).
pub const MTB_PER_NS: f64 = 8.0;
/// Fine correction units per nanosecond (1 FTB = 1 ps).
pub const FTB_PER_NS: f64 = 1000.0;

/// Where a raw field lives inside an image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Span
{
	/// A whole byte.
	Byte(usize),
	/// A 16-bit value, least significant byte first.
	Word{low: usize, high: usize},
	/// A 12-bit value: a full low byte plus one nibble (`shift` 0 or 4) of a byte shared with another field.
	Split{low: usize, high: usize, shift: u8},
}

impl Span
{
	pub fn max(&self) -> u16
	{
		match self
		{
			Self::Byte(..) => 0xFF,
			Self::Word{..} => 0xFFFF,
			Self::Split{..} => 0xFFF,
		}
	}

	pub fn read(&self, src: &[u8]) -> u16
	{
		match *self
		{
			Self::Byte(pos) => src[pos] as u16,
			Self::Word{low, high} => u16::from_le_bytes([src[low], src[high]]),
			Self::Split{low, high, shift} => (((src[high] >> shift) & 0xF) as u16) << 8 | src[low] as u16,
		}
	}

	/// Stores `value`, touching only the bits that belong to this field.
	pub fn write(&self, dst: &mut [u8], value: u16)
	{
		debug_assert!(value <= self.max());
		match *self
		{
			Self::Byte(pos) => dst[pos] = value as u8,
			Self::Word{low, high} =>
			{
				let [lsb, msb] = value.to_le_bytes();
				dst[low] = lsb;
				dst[high] = msb;
			},
			Self::Split{low, high, shift} =>
			{
				let mask = 0xFu8 << shift;
				dst[low] = value as u8;
				dst[high] = (dst[high] & !mask) | ((((value >> 8) as u8) << shift) & mask);
			},
		}
	}
}

/// A duration split into medium time base units plus a signed fine correction in picoseconds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FineTime
{
	pub base: u16,
	/// Two's complement on the wire, usually negative on modules faster than DDR3-1600.
	pub fine: i8,
}

impl FineTime
{
	pub fn new(base: u16, fine: i8) -> Self
	{
		Self{base, fine}
	}

	pub fn ns(&self) -> f64
	{
		self.base as f64 / MTB_PER_NS + self.fine as f64 / FTB_PER_NS
	}

	/// Floors `ns` to whole MTB units and rounds the remainder to picoseconds, so `fine` is never negative.
	pub fn from_ns(ns: f64, max: u16) -> Result<Self, RangeError>
	{
		if !ns.is_finite() || ns < 0.0
		{
			return Err(RangeError::Overflow{value: u32::MAX, max: max as u32});
		}
		let scaled = ns * MTB_PER_NS;
		// absorb representation error so exact multiples of 1/8 ns don't floor one unit low
		let base = (scaled + 1e-9).floor();
		if base > max as f64
		{
			return Err(RangeError::Overflow{value: base as u32, max: max as u32});
		}
		let fine = (FTB_PER_NS * (scaled - base).max(0.0) / MTB_PER_NS).round();
		Ok(Self{base: base as u16, fine: fine as i8})
	}
}

/// Whole clock cycles covered by `ns`, rounded half away from zero.
pub fn ticks(ns: f64, period_ns: f64) -> u32
{
	// float to int casts saturate and map NaN to 0, which covers a zero period
	(ns / period_ns).round() as u32
}

/// Decodes a composite decimal voltage byte to centivolts.
pub fn decode_centivolts(value: u8) -> u16
{
	(value & 0x1) as u16 * 5 + ((value >> 1) & 0xF) as u16 * 10 + ((value >> 5) & 0x3) as u16 * 100
}

/// Encodes centivolts into the composite decimal layout, keeping bit 7 of `prev`.
pub fn encode_centivolts(centivolts: u16, prev: u8) -> Result<u8, RangeError>
{
	if centivolts % 5 != 0 || centivolts > 395
	{
		return Err(RangeError::Voltage(centivolts));
	}
	let half = (centivolts % 10 == 5) as u8;
	let tenths = ((centivolts / 10) % 10) as u8;
	let units = (centivolts / 100) as u8;
	Ok((prev & 0x80) | half | tenths << 1 | units << 5)
}

/// Supported CAS latencies, 4 through 18.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ClSupport(u16);

impl ClSupport
{
	pub const MIN: u32 = 4;
	pub const MAX: u32 = 18;
	const MASK: u16 = (1 << (Self::MAX - Self::MIN + 1)) - 1;

	pub fn new() -> Self
	{
		Self(0)
	}

	/// Bit `i` of `low` is CL `4 + i`, bit `i` of `high` is CL `12 + i`.
	pub fn decode(low: u8, high: u8) -> Self
	{
		Self((low as u16 | (high as u16) << 8) & Self::MASK)
	}

	/// Returns both bitmap bytes; bit 7 of `prev_high` is not a latency and is carried over.
	pub fn encode(&self, prev_high: u8) -> [u8; 2]
	{
		let [low, high] = self.0.to_le_bytes();
		[low, (prev_high & 0x80) | high]
	}

	pub fn check(cl: u32) -> Result<(), RangeError>
	{
		if (Self::MIN..=Self::MAX).contains(&cl) {Ok(())}
		else {Err(RangeError::UnsupportedCl(cl))}
	}

	fn mask(cl: u32) -> Result<u16, RangeError>
	{
		Self::check(cl)?;
		Ok(1 << (cl - Self::MIN))
	}

	pub fn contains(&self, cl: u32) -> Result<bool, RangeError>
	{
		Ok((self.0 & Self::mask(cl)?) != 0)
	}

	/// Returns whether the set changed.
	pub fn set(&mut self, cl: u32, supported: bool) -> Result<bool, RangeError>
	{
		let mask = Self::mask(cl)?;
		let prev = self.0;
		if supported {self.0 |= mask;}
		else {self.0 &= !mask;}
		Ok(prev != self.0)
	}

	pub fn insert(&mut self, cl: u32) -> Result<bool, RangeError>
	{
		self.set(cl, true)
	}

	pub fn remove(&mut self, cl: u32) -> Result<bool, RangeError>
	{
		self.set(cl, false)
	}

	pub fn is_empty(&self) -> bool
	{
		self.0 == 0
	}

	pub fn get_bits(&self) -> u16
	{
		self.0
	}

	pub fn iter(&self) -> ClIter
	{
		ClIter{next: Self::MIN, bits: self.0}
	}
}

impl fmt::Display for ClSupport
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		f.write_char('{')?;
		for (i, cl) in self.iter().enumerate()
		{
			if i > 0 {f.write_str(", ")?;}
			write!(f, "{cl}")?;
		}
		f.write_char('}')
	}
}

impl IntoIterator for ClSupport
{
	type Item = u32;
	type IntoIter = ClIter;

	fn into_iter(self) -> Self::IntoIter
	{
		self.iter()
	}
}

pub struct ClIter
{
	next: u32,
	bits: u16,
}

impl Iterator for ClIter
{
	type Item = u32;

	fn next(&mut self) -> Option<Self::Item>
	{
		if self.bits == 0 {return None;}
		let dist = self.bits.trailing_zeros();
		let cl = self.next + dist;
		// shift in two steps, `dist + 1` may be 16
		self.bits = (self.bits >> dist) >> 1;
		self.next = cl + 1;
		Some(cl)
	}
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum RangeError
{
	#[error("tick count must be at least 1")]
	ZeroTicks,
	#[error("unsupported CAS latency {0} (must be 4 to 18)")]
	UnsupportedCl(u32),
	#[error("raw value overflow (need {value}, max {max})")]
	Overflow{value: u32, max: u32},
	#[error("voltage of {0} cV is not encodable")]
	Voltage(u16),
	#[error("invalid frequency ({0} MHz)")]
	Frequency(f64),
	#[error("invalid DIMM count ({0}, max 3)")]
	DimmCount(u8),
	#[error("invalid time base {dividend}/{divisor} ns")]
	TimeBase{dividend: u8, divisor: u8},
}
