/// Built-in demux engines.
pub mod symphonia;
