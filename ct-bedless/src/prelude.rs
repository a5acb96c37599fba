//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::{BodyMask, CtScan, CtWindow, Geometry, GridAttr, SlicePreview, Volume};

pub use crate::{BedError, BedResult};

pub use crate::{remove_bed, BedRemoval, BedRemovalConfig, BedRemovalOutput, OutputMode};

pub use crate::{HuRange, Interpolation, MaskRule, MaskUpsampling};

pub use crate::consts::hu::AIR;
