//! Intel Extreme Memory Profile block, stored at `0xB0` of a DDR3 SPD image.

use log::debug;
use thiserror::Error;

use crate::field::RangeError;
use crate::macros::named_enum;

pub mod profile;

use profile::XmpProfile;


pub const SIZE: usize = 79;
pub const MAGIC: [u8; 2] = [0x0C, 0x4A];
const FLAGS: usize = 2;
const VERSION: usize = 3;
/// Bits 6 and 7 of the flags byte are reserved.
const FLAGS_RESERVED: u8 = 0xC0;

named_enum!
{
	#[enum(pub)]
	#[FromStr(pub struct UnknownProfile)]
	enum ProfileId
	{
		First = "1",
		Second = "2",
	}
}

impl ProfileId
{
	fn offset(self) -> usize
	{
		match self
		{
			Self::First => 9,
			Self::Second => 9 + profile::SIZE,
		}
	}

	fn mtb_offset(self) -> usize
	{
		match self
		{
			Self::First => 4,
			Self::Second => 6,
		}
	}

	fn enable_mask(self) -> u8
	{
		match self
		{
			Self::First => 1 << 0,
			Self::Second => 1 << 1,
		}
	}

	fn dimm_shift(self) -> u8
	{
		match self
		{
			Self::First => 2,
			Self::Second => 4,
		}
	}
}

/// Medium time base of a profile: one raw tick lasts `dividend / divisor` nanoseconds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Mtb
{
	pub dividend: u8,
	pub divisor: u8,
}

impl Mtb
{
	pub fn new(dividend: u8, divisor: u8) -> Self
	{
		Self{dividend, divisor}
	}

	/// Tick duration in nanoseconds, 0 for a zero divisor.
	pub fn ns(&self) -> f64
	{
		if self.divisor == 0 {0.0}
		else {self.dividend as f64 / self.divisor as f64}
	}
}

#[derive(Clone, Debug)]
pub struct XmpBlock
{
	bytes: [u8; SIZE],
	enabled: [bool; 2],
	dimms: [u8; 2],
	version: u8,
	profiles: [Option<XmpProfile>; 2],
}

impl XmpBlock
{
	pub fn read(src: &[u8]) -> Result<Self, ReadError>
	{
		if src.len() < SIZE
		{
			return Err(ReadError::Underflow{need: SIZE, have: src.len()});
		}
		if src[..2] != MAGIC
		{
			return Err(ReadError::Magic{have: [src[0], src[1]]});
		}
		let mut bytes = [0u8; SIZE];
		bytes.copy_from_slice(&src[..SIZE]);

		let mut enabled = [false; 2];
		let mut dimms = [0u8; 2];
		let mut profiles = [None, None];
		for &id in ProfileId::ALL
		{
			enabled[id as usize] = (bytes[FLAGS] & id.enable_mask()) != 0;
			dimms[id as usize] = (bytes[FLAGS] >> id.dimm_shift()) & 0x3;
			if enabled[id as usize]
			{
				profiles[id as usize] = Some(Self::read_profile(&bytes, id));
			}
		}
		let version = bytes[VERSION];
		debug!("XMP {}.{} with profiles {enabled:?}", version >> 4, version & 0xF);
		Ok(Self{bytes, enabled, dimms, version, profiles})
	}

	fn read_profile(bytes: &[u8; SIZE], id: ProfileId) -> XmpProfile
	{
		let mtb = Mtb::new(bytes[id.mtb_offset()], bytes[id.mtb_offset() + 1]);
		let mut raw = [0u8; profile::SIZE];
		raw.copy_from_slice(&bytes[id.offset()..id.offset() + profile::SIZE]);
		XmpProfile::from_bytes(&raw, mtb)
	}

	/// Raw version byte, major revision in the high nibble.
	pub fn version(&self) -> u8
	{
		self.version
	}

	pub fn is_enabled(&self, id: ProfileId) -> bool
	{
		self.enabled[id as usize]
	}

	/// Enabling a profile decodes it from the stored bytes if it wasn't decoded before.
	pub fn set_enabled(&mut self, id: ProfileId, enabled: bool)
	{
		if enabled && self.profiles[id as usize].is_none()
		{
			self.profiles[id as usize] = Some(Self::read_profile(&self.bytes, id));
		}
		self.enabled[id as usize] = enabled;
	}

	pub fn dimms_per_channel(&self, id: ProfileId) -> u8
	{
		self.dimms[id as usize]
	}

	pub fn set_dimms_per_channel(&mut self, id: ProfileId, count: u8) -> Result<(), RangeError>
	{
		if count > 3
		{
			return Err(RangeError::DimmCount(count));
		}
		self.dimms[id as usize] = count;
		Ok(())
	}

	pub fn profile(&self, id: ProfileId) -> Option<&XmpProfile>
	{
		if self.enabled[id as usize] {self.profiles[id as usize].as_ref()}
		else {None}
	}

	pub fn profile_mut(&mut self, id: ProfileId) -> Option<&mut XmpProfile>
	{
		if self.enabled[id as usize] {self.profiles[id as usize].as_mut()}
		else {None}
	}

	/// Enabled profiles in slot order.
	pub fn profiles(&self) -> impl Iterator<Item = (ProfileId, &XmpProfile)> + '_
	{
		ProfileId::ALL.iter().filter_map(move |&id| self.profile(id).map(|p| (id, p)))
	}

	pub fn encode(&self) -> [u8; SIZE]
	{
		let mut dst = self.bytes;
		// rebuilt from scratch so stale enable and DIMM bits never survive
		let mut flags = dst[FLAGS] & FLAGS_RESERVED;
		for &id in ProfileId::ALL
		{
			if self.enabled[id as usize] {flags |= id.enable_mask();}
			flags |= (self.dimms[id as usize] & 0x3) << id.dimm_shift();
		}
		dst[FLAGS] = flags;
		dst[VERSION] = self.version;
		for (id, p) in self.profiles()
		{
			let pos = id.offset();
			dst[pos..pos + profile::SIZE].copy_from_slice(&p.encode());
			let mtb = p.mtb();
			dst[id.mtb_offset()] = mtb.dividend;
			dst[id.mtb_offset() + 1] = mtb.divisor;
		}
		dst
	}
}

#[derive(Debug, Error)]
pub enum ReadError
{
	#[error("input buffer underflow (need {need}, got {have})")]
	Underflow{need: usize, have: usize},
	#[error("invalid XMP header (expected [0C, 4A], got {have:02X?})")]
	Magic{have: [u8; 2]},
}
