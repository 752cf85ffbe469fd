// Frame and grayscale image buffers

/// Width and height of a frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Packed RGB frame (3 bytes per pixel, no row padding)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// Black frame of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0])
    }

    /// Frame where every pixel has the same color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = FrameSize::new(width, height).area();
        let mut data = Vec::with_capacity(pixels * Self::CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self { width, height, data }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// True until a source has written into this frame
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resize the backing storage for a new geometry, keeping the allocation
    /// when the size is unchanged
    pub fn reshape(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.resize(FrameSize::new(width, height).area() * Self::CHANNELS, 0);
    }
}

/// Single-channel 8-bit image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrayImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; FrameSize::new(width, height).area()],
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn reshape(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.resize(FrameSize::new(width, height).area(), 0);
    }
}
