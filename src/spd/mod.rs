//! The 128-byte DDR3 SPD base image and its optional XMP block.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, trace};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::crc16;
use crate::field::{self, ClSupport, FineTime, RangeError, Span};
use crate::macros::named_enum;
use crate::xmp::{self, XmpBlock};

#[cfg(test)]
mod test;

pub const SIZE: usize = 128;
/// Bytes `0x00..CRC_LEN` are covered by the checksum.
pub const CRC_LEN: usize = 0x75;
pub const CRC_LOW: usize = 0x7E;
pub const CRC_HIGH: usize = 0x7F;
pub const XMP_START: usize = 0xB0;
const VOLTAGE: usize = 0x06;
const TCK: usize = 0x0C;
const CL_LOW: usize = 0x0E;
const CL_HIGH: usize = 0x0F;
const TCK_FINE: usize = 0x22;
const VOLTAGE_MASK: u8 = 0x07;

named_enum!
{
	#[enum(pub)]
	#[FromStr(pub struct UnknownVoltage)]
	enum Voltage
	{
		V1_25 = "1.25v",
		V1_35 = "1.35v",
		V1_50 = "1.50v",
	}
}

impl Voltage
{
	fn mask(self) -> u8
	{
		match self
		{
			Self::V1_25 => 1 << 2,
			Self::V1_35 => 1 << 1,
			Self::V1_50 => 1 << 0,
		}
	}

	/// The 1.5V bit is set when the module is *not* 1.5V operable.
	fn inverted(self) -> bool
	{
		matches!(self, Self::V1_50)
	}
}

named_enum!
{
	#[enum(pub)]
	#[FromStr(pub struct UnknownTiming)]
	enum Timing
	{
		Cl = "tCL",
		Rcd = "tRCD",
		Rp = "tRP",
		Ras = "tRAS",
		Rc = "tRC",
		Rfc = "tRFC",
		Rrd = "tRRD",
		Faw = "tFAW",
		Wr = "tWR",
		Wtr = "tWTR",
		Rtp = "tRTP",
	}
}

const TIMING_COUNT: usize = Timing::ALL.len();

impl Timing
{
	fn span(self) -> Span
	{
		match self
		{
			Self::Cl => Span::Byte(0x10),
			Self::Wr => Span::Byte(0x11),
			Self::Rcd => Span::Byte(0x12),
			Self::Rrd => Span::Byte(0x13),
			Self::Rp => Span::Byte(0x14),
			Self::Ras => Span::Split{low: 0x16, high: 0x15, shift: 0},
			Self::Rc => Span::Split{low: 0x17, high: 0x15, shift: 4},
			Self::Rfc => Span::Word{low: 0x18, high: 0x19},
			Self::Wtr => Span::Byte(0x1A),
			Self::Rtp => Span::Byte(0x1B),
			Self::Faw => Span::Split{low: 0x1D, high: 0x1C, shift: 0},
		}
	}

	/// Position of the picosecond correction byte, if the field has one.
	fn fine(self) -> Option<usize>
	{
		match self
		{
			Self::Cl => Some(0x23),
			Self::Rcd => Some(0x24),
			Self::Rp => Some(0x25),
			Self::Rc => Some(0x26),
			_ => None,
		}
	}
}

/// Period overrides for clock encodings whose millisecond-rounded value is too coarse.
fn refine_period(ns: f64) -> f64
{
	match (ns * 1000.0).round() as u32
	{
		938 => 0.9375, // 1066.666 MHz
		1071 => 1000.0 * 3.0 / 2800.0, // 933.333 MHz
		_ => ns,
	}
}

#[derive(Clone, Debug)]
pub struct SpdImage
{
	bytes: Vec<u8>,
	voltages: [bool; 3],
	tck: FineTime,
	cls: ClSupport,
	timings: [FineTime; TIMING_COUNT],
	xmp: Option<XmpBlock>,
}

impl SpdImage
{
	/// Decodes an image of at least 128 bytes. The XMP block is only looked for in images that reach past `0xFF`.
	pub fn read(src: &[u8]) -> Result<Self, ReadError>
	{
		if src.len() < SIZE
		{
			return Err(ReadError::Underflow{need: SIZE, have: src.len()});
		}
		let bytes = src.to_vec();

		let mut voltages = [false; 3];
		for &v in Voltage::ALL
		{
			voltages[v as usize] = ((bytes[VOLTAGE] & v.mask()) != 0) != v.inverted();
		}
		let tck = FineTime::new(bytes[TCK] as u16, bytes[TCK_FINE] as i8);
		let cls = ClSupport::decode(bytes[CL_LOW], bytes[CL_HIGH]);
		let mut timings = [FineTime::default(); TIMING_COUNT];
		for &t in Timing::ALL
		{
			let fine = t.fine().map_or(0, |pos| bytes[pos] as i8);
			timings[t as usize] = FineTime::new(t.span().read(&bytes), fine);
		}

		let xmp = match bytes.get(XMP_START..XMP_START + xmp::SIZE)
		{
			None =>
			{
				debug!("image too short for XMP ({} bytes)", bytes.len());
				None
			},
			Some(region) => match XmpBlock::read(region)
			{
				Ok(xmp) => Some(xmp),
				Err(e) =>
				{
					debug!("no XMP found: {e}");
					None
				},
			},
		};
		Ok(Self{bytes, voltages, tck, cls, timings, xmp})
	}

	pub fn voltage(&self, voltage: Voltage) -> bool
	{
		self.voltages[voltage as usize]
	}

	pub fn set_voltage(&mut self, voltage: Voltage, enabled: bool)
	{
		self.voltages[voltage as usize] = enabled;
	}

	pub fn cl_support(&self) -> ClSupport
	{
		self.cls
	}

	pub fn cl_supported(&self, cl: u32) -> Result<bool, RangeError>
	{
		self.cls.contains(cl)
	}

	pub fn set_cl_supported(&mut self, cl: u32, supported: bool) -> Result<(), RangeError>
	{
		self.cls.set(cl, supported)?;
		Ok(())
	}

	/// Clock period in nanoseconds, after the exact-rational overrides.
	pub fn period_ns(&self) -> f64
	{
		refine_period(self.tck.ns())
	}

	/// Clock frequency in MHz (half the transfer rate).
	pub fn frequency(&self) -> f64
	{
		1000.0 / self.period_ns()
	}

	/// Re-derives the raw clock period; lossy, reading it back may not give `mhz` exactly.
	pub fn set_frequency(&mut self, mhz: f64) -> Result<(), RangeError>
	{
		if !mhz.is_finite() || mhz <= 0.0
		{
			return Err(RangeError::Frequency(mhz));
		}
		match FineTime::from_ns(1000.0 / mhz, 0xFF)
		{
			Ok(tck) if tck.base > 0 =>
			{
				trace!("clock period {tck:?} for {mhz} MHz");
				self.tck = tck;
				Ok(())
			},
			_ => Err(RangeError::Frequency(mhz)),
		}
	}

	/// Changes the clock while keeping the cycle count of every timing, which are re-encoded at the new period.
	/// Timings that read as 0 cycles are cleared. Nothing changes if any timing no longer fits.
	pub fn set_frequency_scaled(&mut self, mhz: f64) -> Result<(), RangeError>
	{
		let saved = (self.tck, self.timings, self.cls);
		let cycles: Vec<_> = self.timings().collect();
		self.set_frequency(mhz)?;
		let result = cycles.into_iter().try_for_each(|(t, ticks)|
		{
			if ticks == 0
			{
				self.timings[t as usize] = FineTime::default();
				Ok(())
			}
			else {self.set_timing(t, ticks)}
		});
		if result.is_err() {(self.tck, self.timings, self.cls) = saved;}
		result
	}

	/// Raw duration of a timing field in nanoseconds.
	pub fn timing_ns(&self, timing: Timing) -> f64
	{
		self.timings[timing as usize].ns()
	}

	/// A timing in whole clock cycles at the current frequency.
	pub fn timing(&self, timing: Timing) -> u32
	{
		field::ticks(self.timing_ns(timing), self.period_ns())
	}

	pub fn timings(&self) -> impl Iterator<Item = (Timing, u32)> + '_
	{
		Timing::ALL.iter().map(move |&t| (t, self.timing(t)))
	}

	/// Sets a timing in clock cycles. `tCL` must be a valid CAS latency and becomes supported.
	pub fn set_timing(&mut self, timing: Timing, ticks: u32) -> Result<(), RangeError>
	{
		if ticks < 1
		{
			return Err(RangeError::ZeroTicks);
		}
		if timing == Timing::Cl
		{
			ClSupport::check(ticks)?;
		}
		let ns = ticks as f64 * self.period_ns();
		let mut value = FineTime::from_ns(ns, timing.span().max())?;
		if timing.fine().is_none()
		{
			value.fine = 0;
		}
		trace!("{timing} = {ticks} ({ns:.3} ns, raw {value:?})");
		self.timings[timing as usize] = value;
		if timing == Timing::Cl
		{
			self.cls.insert(ticks)?;
		}
		Ok(())
	}

	/// Sets several timings in order; if one fails none of them change.
	pub fn set_timings(&mut self, values: impl IntoIterator<Item = (Timing, u32)>) -> Result<(), RangeError>
	{
		let saved = (self.timings, self.cls);
		let result = values.into_iter().try_for_each(|(t, ticks)| self.set_timing(t, ticks));
		if result.is_err() {(self.timings, self.cls) = saved;}
		result
	}

	pub fn xmp(&self) -> Option<&XmpBlock>
	{
		self.xmp.as_ref()
	}

	pub fn xmp_mut(&mut self) -> Option<&mut XmpBlock>
	{
		self.xmp.as_mut()
	}

	/// Serializes every field over a copy of the source bytes and stores the checksum.
	pub fn encode(&self) -> Vec<u8>
	{
		let mut dst = self.bytes.clone();
		let mut flags = dst[VOLTAGE] & !VOLTAGE_MASK;
		for &v in Voltage::ALL
		{
			if self.voltages[v as usize] != v.inverted() {flags |= v.mask();}
		}
		dst[VOLTAGE] = flags;
		dst[TCK] = self.tck.base as u8;
		dst[TCK_FINE] = self.tck.fine as u8;
		let [low, high] = self.cls.encode(dst[CL_HIGH]);
		dst[CL_LOW] = low;
		dst[CL_HIGH] = high;
		for &t in Timing::ALL
		{
			let value = self.timings[t as usize];
			t.span().write(&mut dst, value.base);
			if let Some(pos) = t.fine() {dst[pos] = value.fine as u8;}
		}
		if let Some(xmp) = &self.xmp
		{
			dst[XMP_START..XMP_START + xmp::SIZE].copy_from_slice(&xmp.encode());
		}

		// low byte first, consumers expect this order
		let [low, high] = crc16::checksum(&dst[..CRC_LEN]).to_le_bytes();
		dst[CRC_LOW] = low;
		dst[CRC_HIGH] = high;
		dst
	}

	pub fn checksum(&self) -> u16
	{
		let data = self.encode();
		u16::from_le_bytes([data[CRC_LOW], data[CRC_HIGH]])
	}

	/// Writes the encoded image to `path` and returns its checksum. The data goes to a temporary file next to `path`
	/// which then replaces it, a failed save leaves any existing file as it was.
	pub fn save(&self, path: impl AsRef<Path>) -> Result<u16, SaveError>
	{
		let path = path.as_ref();
		let data = self.encode();
		let wrap = |source: io::Error| SaveError::Io{path: path.to_path_buf(), source};
		let dir = match path.parent()
		{
			Some(dir) if !dir.as_os_str().is_empty() => dir,
			_ => Path::new("."),
		};
		let mut fo = NamedTempFile::new_in(dir).map_err(wrap)?;
		fo.write_all(&data).map_err(wrap)?;
		fo.as_file().sync_all().map_err(wrap)?;
		if let Ok(meta) = fs::metadata(path)
		{
			if meta.is_file() {fo.as_file().set_permissions(meta.permissions()).map_err(wrap)?;}
		}
		fo.persist(path).map_err(|e| wrap(e.error))?;
		let crc = u16::from_le_bytes([data[CRC_LOW], data[CRC_HIGH]]);
		info!("saved {} bytes to {} (checksum 0x{crc:04X})", data.len(), path.display());
		Ok(crc)
	}
}

#[derive(Debug, Error)]
pub enum ReadError
{
	#[error("input buffer underflow (need {need}, got {have})")]
	Underflow{need: usize, have: usize},
}

#[derive(Debug, Error)]
pub enum SaveError
{
	#[error("could not write {}", path.display())]
	Io{path: PathBuf, #[source] source: io::Error},
}
