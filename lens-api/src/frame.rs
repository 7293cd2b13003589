//! Frame handoff types. A producer borrows its pixel buffer for the duration of
//! `FrameSink::on_frame`; the core copies what it needs into `FramePlanes` before returning.

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameFormatError {
    #[error("pixel format {0:?} cannot be bound as luma + chroma planes")]
    UnsupportedFormat(PixelFormat),
    #[error("frame has zero size ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
    #[error("{format:?} expects {expected} planes, got {actual}")]
    PlaneCount { format: PixelFormat, expected: usize, actual: usize },
    #[error("plane {plane}: stride {stride} is smaller than a {row}-byte row")]
    StrideTooSmall { plane: usize, stride: usize, row: usize },
    #[error("plane {plane}: expected at least {expected} bytes, got {actual}")]
    PlaneTooSmall { plane: usize, expected: usize, actual: usize },
    #[error("frame {width}x{height} exceeds the {max}px texture limit")]
    TooLarge { width: u32, height: u32, max: u32 },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to start frame source: {0}")]
    Start(String),
    #[error("Frame source permission denied")]
    PermissionDenied,
    #[error("No capture device found")]
    NoDevice,
}

/// Pixel layout of a delivered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Biplanar 4:2:0: Y plane + interleaved CbCr plane. Native camera format.
    Nv12,
    /// Triplanar 4:2:0: Y, U, V. Chroma is interleaved on copy.
    I420,
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Nv12 => 2,
            PixelFormat::I420 => 3,
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 1,
        }
    }

    /// True when the frame can feed the luma + chroma texture pair.
    pub fn is_biplanar_compatible(&self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::I420)
    }
}

/// One borrowed image plane. `stride` is bytes per row including padding.
#[derive(Clone, Copy, Debug)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self { data, stride }
    }
}

/// Borrowed view of a captured frame. Only valid inside the callback it was passed to.
#[derive(Clone, Copy, Debug)]
pub struct FrameRef<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: &'a [Plane<'a>],
}

impl<'a> FrameRef<'a> {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: &'a [Plane<'a>]) -> Self {
        Self { width, height, format, planes }
    }
}

/// Owned, tightly packed luma + interleaved chroma planes ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FramePlanes {
    width: u32,
    height: u32,
    luma: Vec<u8>,
    chroma: Vec<u8>,
}

impl FramePlanes {
    /// Wrap already packed planes. Sizes are checked by `validate`, not here.
    pub fn new(width: u32, height: u32, luma: Vec<u8>, chroma: Vec<u8>) -> Self {
        Self { width, height, luma, chroma }
    }

    /// Copy a borrowed frame into freshly allocated planes.
    pub fn from_frame(frame: &FrameRef<'_>) -> Result<Self, FrameFormatError> {
        let mut planes = Self::default();
        planes.copy_from(frame)?;
        Ok(planes)
    }

    /// Chroma plane size in CbCr pairs for a 4:2:0 frame.
    pub fn chroma_size(width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(2), height.div_ceil(2))
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn size(&self) -> (u32, u32) { (self.width, self.height) }
    pub fn luma(&self) -> &[u8] { &self.luma }
    pub fn chroma(&self) -> &[u8] { &self.chroma }

    /// Copy `frame` into these planes, reusing the existing allocations.
    /// On error the previous contents are left unspecified.
    pub fn copy_from(&mut self, frame: &FrameRef<'_>) -> Result<(), FrameFormatError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(FrameFormatError::ZeroSized { width: frame.width, height: frame.height });
        }
        let expected = frame.format.plane_count();
        if frame.planes.len() != expected {
            return Err(FrameFormatError::PlaneCount {
                format: frame.format,
                expected,
                actual: frame.planes.len(),
            });
        }
        let (w, h) = (frame.width as usize, frame.height as usize);
        let (cw, ch) = Self::chroma_size(frame.width, frame.height);
        let (cw, ch) = (cw as usize, ch as usize);

        match frame.format {
            PixelFormat::Nv12 => {
                self.luma.clear();
                copy_rows(0, &frame.planes[0], w, h, &mut self.luma)?;
                self.chroma.clear();
                copy_rows(1, &frame.planes[1], cw * 2, ch, &mut self.chroma)?;
            }
            PixelFormat::I420 => {
                self.luma.clear();
                copy_rows(0, &frame.planes[0], w, h, &mut self.luma)?;
                self.chroma.clear();
                let u = &frame.planes[1];
                let v = &frame.planes[2];
                check_plane(1, u, cw, ch)?;
                check_plane(2, v, cw, ch)?;
                self.chroma.reserve(cw * ch * 2);
                for row in 0..ch {
                    let u_row = &u.data[row * u.stride..row * u.stride + cw];
                    let v_row = &v.data[row * v.stride..row * v.stride + cw];
                    for (cb, cr) in u_row.iter().zip(v_row) {
                        self.chroma.push(*cb);
                        self.chroma.push(*cr);
                    }
                }
            }
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => return Err(FrameFormatError::UnsupportedFormat(frame.format)),
        }
        self.width = frame.width;
        self.height = frame.height;
        Ok(())
    }

    /// Check plane lengths against the frame size.
    pub fn validate(&self) -> Result<(), FrameFormatError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameFormatError::ZeroSized { width: self.width, height: self.height });
        }
        let luma_len = self.width as usize * self.height as usize;
        if self.luma.len() != luma_len {
            return Err(FrameFormatError::PlaneTooSmall { plane: 0, expected: luma_len, actual: self.luma.len() });
        }
        let (cw, ch) = Self::chroma_size(self.width, self.height);
        let chroma_len = cw as usize * ch as usize * 2;
        if self.chroma.len() != chroma_len {
            return Err(FrameFormatError::PlaneTooSmall { plane: 1, expected: chroma_len, actual: self.chroma.len() });
        }
        Ok(())
    }

    /// Reject frames that do not fit in a `max` x `max` texture. Chroma is never larger than luma.
    pub fn check_fits(&self, max: u32) -> Result<(), FrameFormatError> {
        if self.width > max || self.height > max {
            return Err(FrameFormatError::TooLarge { width: self.width, height: self.height, max });
        }
        Ok(())
    }
}

fn check_plane(index: usize, plane: &Plane<'_>, row: usize, rows: usize) -> Result<(), FrameFormatError> {
    if plane.stride < row {
        return Err(FrameFormatError::StrideTooSmall { plane: index, stride: plane.stride, row });
    }
    let needed = plane.stride * (rows - 1) + row;
    if plane.data.len() < needed {
        return Err(FrameFormatError::PlaneTooSmall { plane: index, expected: needed, actual: plane.data.len() });
    }
    Ok(())
}

fn copy_rows(
    index: usize,
    plane: &Plane<'_>,
    row: usize,
    rows: usize,
    dst: &mut Vec<u8>,
) -> Result<(), FrameFormatError> {
    check_plane(index, plane, row, rows)?;
    if plane.stride == row {
        dst.extend_from_slice(&plane.data[..row * rows]);
        return Ok(());
    }
    dst.reserve(row * rows);
    for r in 0..rows {
        let start = r * plane.stride;
        dst.extend_from_slice(&plane.data[start..start + row]);
    }
    Ok(())
}

/// Receives frames from a capture pipeline. Called on the producer thread at camera rate.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: FrameRef<'_>);
}

/// Platform capture collaborator (camera session). Pushes frames into a sink until stopped.
pub trait FrameSource: Send {
    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), SourceError>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_copy_strips_row_padding() {
        // 4x2 luma with stride 6, 2x1 chroma pairs with stride 6
        let y = [1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0];
        let uv = [10, 20, 30, 40, 0, 0];
        let planes = [Plane::new(&y, 6), Plane::new(&uv, 6)];
        let frame = FrameRef::new(4, 2, PixelFormat::Nv12, &planes);
        let packed = FramePlanes::from_frame(&frame).unwrap();
        assert_eq!(packed.luma(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(packed.chroma(), &[10, 20, 30, 40]);
        assert!(packed.validate().is_ok());
    }

    #[test]
    fn i420_chroma_is_interleaved() {
        let y = [0u8; 9];
        let u = [1, 2, 3, 4];
        let v = [5, 6, 7, 8];
        let planes = [Plane::new(&y, 3), Plane::new(&u, 2), Plane::new(&v, 2)];
        let frame = FrameRef::new(3, 3, PixelFormat::I420, &planes);
        let packed = FramePlanes::from_frame(&frame).unwrap();
        assert_eq!(FramePlanes::chroma_size(3, 3), (2, 2));
        assert_eq!(packed.chroma(), &[1, 5, 2, 6, 3, 7, 4, 8]);
        assert!(packed.validate().is_ok());
    }

    #[test]
    fn packed_rgb_formats_are_rejected() {
        let data = [0u8; 16];
        let planes = [Plane::new(&data, 8)];
        let frame = FrameRef::new(2, 2, PixelFormat::Bgra8, &planes);
        assert_eq!(
            FramePlanes::from_frame(&frame),
            Err(FrameFormatError::UnsupportedFormat(PixelFormat::Bgra8))
        );

        let mut packed = FramePlanes::default();
        let frame = FrameRef::new(2, 2, PixelFormat::Rgba8, &planes);
        assert_eq!(packed.copy_from(&frame), Err(FrameFormatError::UnsupportedFormat(PixelFormat::Rgba8)));
        assert_eq!(packed.size(), (0, 0));
    }

    #[test]
    fn short_planes_are_rejected() {
        let y = [0u8; 7];
        let uv = [0u8; 4];
        let planes = [Plane::new(&y, 4), Plane::new(&uv, 4)];
        let frame = FrameRef::new(4, 2, PixelFormat::Nv12, &planes);
        assert_eq!(
            FramePlanes::from_frame(&frame),
            Err(FrameFormatError::PlaneTooSmall { plane: 0, expected: 8, actual: 7 })
        );

        let y = [0u8; 8];
        let planes = [Plane::new(&y, 4), Plane::new(&uv, 2)];
        let frame = FrameRef::new(4, 2, PixelFormat::Nv12, &planes);
        assert_eq!(
            FramePlanes::from_frame(&frame),
            Err(FrameFormatError::StrideTooSmall { plane: 1, stride: 2, row: 4 })
        );
    }

    #[test]
    fn copy_reuses_buffers_across_sizes() {
        let mut packed = FramePlanes::default();
        let y = vec![7u8; 16];
        let uv = vec![9u8; 8];
        let planes = [Plane::new(&y, 4), Plane::new(&uv, 4)];
        packed.copy_from(&FrameRef::new(4, 4, PixelFormat::Nv12, &planes)).unwrap();
        assert_eq!(packed.size(), (4, 4));

        let y = vec![1u8; 4];
        let uv = vec![2u8; 2];
        let planes = [Plane::new(&y, 2), Plane::new(&uv, 2)];
        packed.copy_from(&FrameRef::new(2, 2, PixelFormat::Nv12, &planes)).unwrap();
        assert_eq!(packed.size(), (2, 2));
        assert_eq!(packed.luma(), &[1, 1, 1, 1]);
        assert_eq!(packed.chroma(), &[2, 2]);
    }

    #[test]
    fn validate_catches_mismatched_planes() {
        let planes = FramePlanes::new(4, 4, vec![0; 16], vec![0; 4]);
        assert_eq!(planes.validate(), Err(FrameFormatError::PlaneTooSmall { plane: 1, expected: 8, actual: 4 }));
        let planes = FramePlanes::new(0, 4, Vec::new(), Vec::new());
        assert!(matches!(planes.validate(), Err(FrameFormatError::ZeroSized { .. })));
    }

    #[test]
    fn oversized_frame_passes_validate_but_not_check_fits() {
        let planes = FramePlanes::new(10_000, 2, vec![0; 20_000], vec![0; 10_000]);
        assert!(planes.validate().is_ok());
        assert_eq!(
            planes.check_fits(8192),
            Err(FrameFormatError::TooLarge { width: 10_000, height: 2, max: 8192 })
        );
        assert!(planes.check_fits(10_000).is_ok());
    }
}
