//! A single 35-byte XMP profile: voltage, clock, CAS latencies and 13 timings in MTB ticks.

use thiserror::Error;

use crate::field::{self, ClSupport, RangeError, Span};
use crate::macros::named_enum;
use crate::xmp::Mtb;

pub const SIZE: usize = 35;
const VOLTAGE: usize = 0;
const TCK: usize = 1;
const CL_LOW: usize = 3;
const CL_HIGH: usize = 4;

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
		Cwl = "tCWL",
		Refi = "tREFI",
	}
}

const TIMING_COUNT: usize = Timing::ALL.len();

impl Timing
{
	fn span(self) -> Span
	{
		match self
		{
			Self::Cl => Span::Byte(2),
			Self::Cwl => Span::Byte(5),
			Self::Rp => Span::Byte(6),
			Self::Rcd => Span::Byte(7),
			Self::Wr => Span::Byte(8),
			Self::Ras => Span::Split{low: 10, high: 9, shift: 0},
			Self::Rc => Span::Split{low: 11, high: 9, shift: 4},
			Self::Refi => Span::Word{low: 12, high: 13},
			Self::Rfc => Span::Word{low: 14, high: 15},
			Self::Rtp => Span::Byte(16),
			Self::Rrd => Span::Byte(17),
			Self::Faw => Span::Split{low: 19, high: 18, shift: 0},
			Self::Wtr => Span::Byte(20),
		}
	}
}

/// One XMP profile. Every raw time value counts ticks of the profile's own MTB.
#[derive(Clone, Debug)]
pub struct XmpProfile
{
	bytes: [u8; SIZE],
	mtb: Mtb,
	voltage: u8,
	tck: u8,
	cls: ClSupport,
	raw: [u16; TIMING_COUNT],
}

impl XmpProfile
{
	pub fn read(src: &[u8], mtb: Mtb) -> Result<Self, ReadError>
	{
		let bytes: &[u8; SIZE] = src.try_into().map_err(|_| ReadError::Size{need: SIZE, have: src.len()})?;
		Ok(Self::from_bytes(bytes, mtb))
	}

	pub fn from_bytes(bytes: &[u8; SIZE], mtb: Mtb) -> Self
	{
		let mut raw = [0u16; TIMING_COUNT];
		for &t in Timing::ALL
		{
			raw[t as usize] = t.span().read(bytes);
		}
		Self
		{
			bytes: *bytes,
			mtb,
			voltage: bytes[VOLTAGE],
			tck: bytes[TCK],
			cls: ClSupport::decode(bytes[CL_LOW], bytes[CL_HIGH]),
			raw,
		}
	}

	pub fn mtb(&self) -> Mtb
	{
		self.mtb
	}

	/// Replaces the time base. Raw values are kept, so every duration scales with it.
	pub fn set_mtb(&mut self, mtb: Mtb) -> Result<(), RangeError>
	{
		if mtb.dividend == 0 || mtb.divisor == 0
		{
			return Err(RangeError::TimeBase{dividend: mtb.dividend, divisor: mtb.divisor});
		}
		self.mtb = mtb;
		Ok(())
	}

	/// Module voltage in centivolts.
	pub fn voltage(&self) -> u16
	{
		field::decode_centivolts(self.voltage)
	}

	/// Accepts multiples of 5 cV up to 3.95V.
	pub fn set_voltage(&mut self, centivolts: u16) -> Result<(), RangeError>
	{
		self.voltage = field::encode_centivolts(centivolts, self.voltage)?;
		Ok(())
	}

	/// Raw clock period in MTB ticks.
	pub fn tck(&self) -> u8
	{
		self.tck
	}

	pub fn set_tck(&mut self, tck: u8) -> Result<(), RangeError>
	{
		if tck == 0
		{
			return Err(RangeError::ZeroTicks);
		}
		self.tck = tck;
		Ok(())
	}

	pub fn period_ns(&self) -> f64
	{
		self.tck as f64 * self.mtb.ns()
	}

	/// Clock frequency in MHz; infinite when the MTB is zero.
	pub fn frequency(&self) -> f64
	{
		1000.0 / self.period_ns()
	}

	/// Picks the raw clock period closest to `mhz`.
	pub fn set_frequency(&mut self, mhz: f64) -> Result<(), RangeError>
	{
		let mtb = self.mtb.ns();
		if !mhz.is_finite() || mhz <= 0.0 || mtb <= 0.0
		{
			return Err(RangeError::Frequency(mhz));
		}
		let tck = (1000.0 / (mhz * mtb)).round();
		if tck < 1.0 || tck > u8::MAX as f64
		{
			return Err(RangeError::Frequency(mhz));
		}
		self.tck = tck as u8;
		Ok(())
	}

	/// Changes the clock like [`set_frequency`](Self::set_frequency) but keeps every timing's cycle count.
	/// Timings that read as 0 cycles are cleared. Nothing changes if any timing no longer fits.
	pub fn set_frequency_scaled(&mut self, mhz: f64) -> Result<(), RangeError>
	{
		let saved = (self.tck, self.raw, self.cls);
		let cycles: Vec<_> = self.timings().collect();
		self.set_frequency(mhz)?;
		let result = cycles.into_iter().try_for_each(|(t, ticks)|
		{
			if ticks == 0
			{
				self.raw[t as usize] = 0;
				Ok(())
			}
			else {self.set_timing(t, ticks)}
		});
		if result.is_err() {(self.tck, self.raw, self.cls) = saved;}
		result
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

	/// Raw value of a timing in MTB ticks.
	pub fn timing_raw(&self, timing: Timing) -> u16
	{
		self.raw[timing as usize]
	}

	pub fn timing_ns(&self, timing: Timing) -> f64
	{
		self.raw[timing as usize] as f64 * self.mtb.ns()
	}

	pub fn timing(&self, timing: Timing) -> u32
	{
		field::ticks(self.timing_ns(timing), self.period_ns())
	}

	pub fn timings(&self) -> impl Iterator<Item = (Timing, u32)> + '_
	{
		Timing::ALL.iter().map(move |&t| (t, self.timing(t)))
	}

	/// Sets a timing in clock cycles, computed as `ticks * tCK` in raw MTB ticks.
	pub fn set_timing(&mut self, timing: Timing, ticks: u32) -> Result<(), RangeError>
	{
		// a zero clock period would store 0 for any cycle count
		if ticks < 1 || self.tck == 0
		{
			return Err(RangeError::ZeroTicks);
		}
		if timing == Timing::Cl
		{
			ClSupport::check(ticks)?;
		}
		let value = ticks as u64 * self.tck as u64;
		let max = timing.span().max();
		if value > max as u64
		{
			return Err(RangeError::Overflow{value: value.min(u32::MAX as u64) as u32, max: max as u32});
		}
		self.raw[timing as usize] = value as u16;
		if timing == Timing::Cl
		{
			self.cls.insert(ticks)?;
		}
		Ok(())
	}

	/// Sets several timings in order; if one fails none of them change.
	pub fn set_timings(&mut self, values: impl IntoIterator<Item = (Timing, u32)>) -> Result<(), RangeError>
	{
		let saved = (self.raw, self.cls);
		let result = values.into_iter().try_for_each(|(t, ticks)| self.set_timing(t, ticks));
		if result.is_err() {(self.raw, self.cls) = saved;}
		result
	}

	pub fn encode(&self) -> [u8; SIZE]
	{
		let mut dst = self.bytes;
		dst[VOLTAGE] = self.voltage;
		dst[TCK] = self.tck;
		let [low, high] = self.cls.encode(dst[CL_HIGH]);
		dst[CL_LOW] = low;
		dst[CL_HIGH] = high;
		for &t in Timing::ALL
		{
			t.span().write(&mut dst, self.raw[t as usize]);
		}
		dst
	}
}

#[derive(Debug, Error)]
pub enum ReadError
{
	#[error("profile size mismatch (need {need}, got {have})")]
	Size{need: usize, have: usize},
}
