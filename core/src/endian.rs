//! Endian-aware integer packing on byte slices, backed by `scroll`.

use scroll::{Pread, Pwrite, BE, LE};

pub fn u16_le_read(buf: &[u8]) -> u16 {
    buf.pread_with::<u16>(0, LE).expect("u16_le_read: short buffer")
}

pub fn u16_le_write(v: u16, buf: &mut [u8]) {
    buf.pwrite_with::<u16>(v, 0, LE).expect("u16_le_write: short buffer");
}

pub fn u16_be_read(buf: &[u8]) -> u16 {
    buf.pread_with::<u16>(0, BE).expect("u16_be_read: short buffer")
}

pub fn u16_be_write(v: u16, buf: &mut [u8]) {
    buf.pwrite_with::<u16>(v, 0, BE).expect("u16_be_write: short buffer");
}

pub fn u32_le_read(buf: &[u8]) -> u32 {
    buf.pread_with::<u32>(0, LE).expect("u32_le_read: short buffer")
}

pub fn u32_le_write(v: u32, buf: &mut [u8]) {
    buf.pwrite_with::<u32>(v, 0, LE).expect("u32_le_write: short buffer");
}

pub fn u32_be_read(buf: &[u8]) -> u32 {
    buf.pread_with::<u32>(0, BE).expect("u32_be_read: short buffer")
}

pub fn u32_be_write(v: u32, buf: &mut [u8]) {
    buf.pwrite_with::<u32>(v, 0, BE).expect("u32_be_write: short buffer");
}
