//! Platform abstraction traits.
//!
//! Everything this crate's core logic treats as an external collaborator
//! (block I/O, filesystems, the kernel loader, a USB device controller and
//! its DMA cache discipline) is expressed here as a trait. The boot core
//! depends on these traits only; concrete implementations are supplied by
//! the embedding platform.

pub mod block;
pub mod cache;
pub mod fs;
pub mod kernel;
pub mod usb;
