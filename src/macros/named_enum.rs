macro_rules!named_enum
{
	{
		$(#[$ext:ident($($ext_args:tt)*)])*
		enum $tname:ident {$($var_name:ident = $var_str:literal),* $(,)?}
	} =>
	{
		// recursive so each attribute expands against the full variant list on its own
		$crate::macros::named_enum!(@impl/ext $tname {$($var_name = $var_str),*} $({$ext($($ext_args)*)})*);
	};
	(@impl/ext $tname:ident {$($var_name:ident = $var_str:literal),*}) => {};
	{
		@impl/ext $tname:ident {$($var_name:ident = $var_str:literal),*}
		{$ext0:ident($($ext0_args:tt)*)} $($more_ext:tt)*
	} =>
	{
		$crate::macros::named_enum!(@impl/ext/$ext0 $tname {$($var_name = $var_str),*} ($($ext0_args)*));
		$crate::macros::named_enum!(@impl/ext $tname {$($var_name = $var_str),*} $($more_ext)*);
	};
	{
		@impl/ext/enum $tname:ident {$($var_name:ident = $var_str:literal),*}
		($vis:vis)
	} =>
	{
		#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
		$vis enum $tname
		{
			$($var_name,)+
		}
		
		impl $tname
		{
			/// Every variant, in declaration (display) order.
			$vis const ALL: &'static [Self] = &[$(Self::$var_name),+];
			
			$vis fn name(self) -> &'static str
			{
				match self
				{
					$(Self::$var_name => $var_str,)+
				}
			}
		}
		
		impl core::fmt::Display for $tname
		{
			fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
			{
				f.write_str(self.name())
			}
		}
	};
	{
		@impl/ext/FromStr $tname:ident {$($var_name:ident = $var_str:literal),*}
		($vis:vis struct $error:ident)
	} =>
	{
		#[derive(Clone, Debug, Eq, PartialEq)]
		$vis struct $error($vis String);
		
		impl core::fmt::Display for $error
		{
			fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
			{
				write!(f, "no {} named {:?}", stringify!($tname), self.0)
			}
		}
		
		impl std::error::Error for $error {}
		
		impl core::str::FromStr for $tname
		{
			type Err = $error;
			
			fn from_str(value: &str) -> Result<Self, $error>
			{
				Self::ALL.iter().copied().find(|v| v.name().eq_ignore_ascii_case(value)).ok_or_else(|| $error(value.to_owned()))
			}
		}
	};
}
pub(crate) use named_enum;
