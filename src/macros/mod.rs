mod named_enum;

pub(crate) use named_enum::named_enum;
