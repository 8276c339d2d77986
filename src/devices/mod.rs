
// Currently all devices supported here are Siglent.  If multiple manufacturers are ever supported, I'll probably
// organize them into modules by manufacturer

pub mod sds5034;
