/**
 * Finds the colored markers in a frame. Each marker is the largest contour
 * inside its HSV range once the mask has been cleaned up; contours smaller
 * than a minimum area are noise.
 */
use std::ffi::c_void;

use image::RgbImage;
use opencv::{
    core::{self, Mat, Vector},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{MarkerObservations, Point2D};


/// HSV bounds in the OpenCV convention: hue 0-179, saturation and value 0-255.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}


impl ColorRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> ColorRange {
        ColorRange { lower: lower, upper: upper }
    }

    fn lower_bound(&self) -> core::Scalar {
        core::Scalar::new(self.lower[0] as f64, self.lower[1] as f64, self.lower[2] as f64, 0.0)
    }

    fn upper_bound(&self) -> core::Scalar {
        core::Scalar::new(self.upper[0] as f64, self.upper[1] as f64, self.upper[2] as f64, 0.0)
    }
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub centroid: Point2D,
    /// Contour area in pixels
    pub area: f64,
}


fn default_kernel() -> i32 {
    5
}


#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MarkerSpec {
    pub range: ColorRange,
    /// Minimum contour area at `process_width`
    pub min_area: f64,
    /// Square kernel sizes for the opening and closing passes over the mask
    #[serde(default = "default_kernel")]
    pub open_kernel: i32,
    #[serde(default = "default_kernel")]
    pub close_kernel: i32,
}


pub trait MarkerDetector {
    /**
     * Returns the marker described by `marker` in an HSV frame, if there is
     * one bigger than `min_area` pixels.
     */
    fn detect(&self, hsv: &Mat, marker: &MarkerSpec, min_area: f64) -> Result<Option<Detection>>;
}


/**
 * Thresholds the frame, opens then closes the mask, and keeps the largest
 * external contour.
 */
pub struct ContourDetector;


fn morph(mask: &Mat, operation: i32, size: i32) -> Result<Mat> {
    if size <= 1 {
        return Ok(mask.try_clone()?);
    }
    let kernel = imgproc::get_structuring_element(
        imgproc::MORPH_RECT,
        core::Size::new(size, size),
        core::Point::new(-1, -1))?;
    let mut result = Mat::default();
    imgproc::morphology_ex(
        mask,
        &mut result,
        operation,
        &kernel,
        core::Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?)?;
    Ok(result)
}


impl MarkerDetector for ContourDetector {
    fn detect(&self, hsv: &Mat, marker: &MarkerSpec, min_area: f64) -> Result<Option<Detection>> {
        let mut mask = Mat::default();
        core::in_range(hsv, &marker.range.lower_bound(), &marker.range.upper_bound(), &mut mask)?;
        let mask = morph(&mask, imgproc::MORPH_OPEN, marker.open_kernel)?;
        let mask = morph(&mask, imgproc::MORPH_CLOSE, marker.close_kernel)?;

        let mut contours = Vector::<Vector<core::Point>>::new();
        imgproc::find_contours(
            &mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            core::Point::new(0, 0))?;

        let mut largest: Option<(f64, Vector<core::Point>)> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area <= min_area {
                continue;
            }
            let larger = match largest {
                Some((best, _)) => area > best,
                None => true,
            };
            if larger {
                largest = Some((area, contour));
            }
        }

        let (area, contour) = match largest {
            Some(largest) => largest,
            None => return Ok(None),
        };
        let moments = imgproc::moments(&contour, false)?;
        if moments.m00 == 0.0 {
            return Ok(None);
        }
        Ok(Some(Detection {
            centroid: Point2D::new((moments.m10 / moments.m00) as f32, (moments.m01 / moments.m00) as f32),
            area: area,
        }))
    }
}


#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Frames wider than this are scaled down first. 0 never scales.
    pub process_width: u32,
    pub front: MarkerSpec,
    pub rear: MarkerSpec,
    pub target: MarkerSpec,
}


impl Default for VisionConfig {
    fn default() -> VisionConfig {
        VisionConfig {
            process_width: 640,
            // Pink
            front: MarkerSpec {
                range: ColorRange::new([140, 60, 80], [175, 255, 255]),
                min_area: 50.0,
                open_kernel: 5,
                close_kernel: 5,
            },
            // Blue
            rear: MarkerSpec {
                range: ColorRange::new([95, 80, 80], [128, 255, 255]),
                min_area: 50.0,
                open_kernel: 5,
                close_kernel: 5,
            },
            // Green
            target: MarkerSpec {
                range: ColorRange::new([40, 40, 40], [95, 255, 255]),
                min_area: 100.0,
                open_kernel: 5,
                close_kernel: 7,
            },
        }
    }
}


/**
 * Scales the frame down to `process_width` if it is wider and converts it to
 * HSV. Returns the HSV frame and the scale ratio used.
 */
pub fn hsv_frame(frame: &RgbImage, process_width: u32) -> Result<(Mat, f64)> {
    // Borrows the frame's pixels; only lives until the first copy below
    let rgb = unsafe {
        Mat::new_rows_cols_with_data(
            frame.height() as i32,
            frame.width() as i32,
            core::CV_8UC3,
            frame.as_raw().as_ptr() as *mut c_void,
            core::Mat_AUTO_STEP,
        )?
    };

    let mut scale_ratio = 1.0;
    let mut hsv = Mat::default();
    if process_width > 0 && frame.width() > process_width {
        scale_ratio = process_width as f64 / frame.width() as f64;
        let height = ((frame.height() as f64 * scale_ratio) as i32).max(1);
        let mut resized = Mat::default();
        imgproc::resize(
            &rgb,
            &mut resized,
            core::Size::new(process_width as i32, height),
            0.0,
            0.0,
            imgproc::INTER_AREA)?;
        imgproc::cvt_color(&resized, &mut hsv, imgproc::COLOR_RGB2HSV, 0)?;
    } else {
        imgproc::cvt_color(&rgb, &mut hsv, imgproc::COLOR_RGB2HSV, 0)?;
    }
    Ok((hsv, scale_ratio))
}


/**
 * Looks for all three markers in one frame. Centroids are in pixels of the
 * scaled-down frame; the distance tolerance is tuned at that size.
 */
pub fn observe(frame: &RgbImage, detector: &dyn MarkerDetector, config: &VisionConfig) -> Result<MarkerObservations> {
    let (hsv, scale_ratio) = hsv_frame(frame, config.process_width)?;
    let area_scale = scale_ratio * scale_ratio;
    let find = |marker: &MarkerSpec| -> Result<Option<Point2D>> {
        let min_area = (marker.min_area * area_scale).floor();
        Ok(detector.detect(&hsv, marker, min_area)?.map(|d| d.centroid))
    };

    Ok(MarkerObservations {
        front: find(&config.front)?,
        rear: find(&config.rear)?,
        target: find(&config.target)?,
    })
}


#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use opencv::{core, prelude::*};

    use super::{ColorRange, ContourDetector, MarkerDetector, MarkerSpec, VisionConfig, hsv_frame, observe};

    const PINK: Rgb<u8> = Rgb([255, 0, 200]);
    const BLUE: Rgb<u8> = Rgb([0, 60, 255]);
    const GREEN: Rgb<u8> = Rgb([0, 200, 0]);

    fn draw_square(frame: &mut RgbImage, center: (u32, u32), half: u32, color: Rgb<u8>) {
        for v in (center.1 - half)..(center.1 + half + 1) {
            for u in (center.0 - half)..(center.0 + half + 1) {
                frame.put_pixel(u, v, color);
            }
        }
    }

    fn hue(color: Rgb<u8>) -> u8 {
        let frame = RgbImage::from_pixel(1, 1, color);
        let (hsv, _) = hsv_frame(&frame, 0).unwrap();
        hsv.at_2d::<core::Vec3b>(0, 0).unwrap()[0]
    }

    fn target() -> MarkerSpec {
        VisionConfig::default().target
    }

    #[test]
    fn test_hsv_conversion() {
        assert!(hue(Rgb([255, 0, 0])) == 0);
        assert!(hue(GREEN) == 60);
        assert!(hue(Rgb([0, 0, 255])) == 120);
        let (hsv, ratio) = hsv_frame(&RgbImage::from_pixel(1, 1, Rgb([128, 128, 128])), 0).unwrap();
        assert!(ratio == 1.0);
        let pixel = hsv.at_2d::<core::Vec3b>(0, 0).unwrap();
        assert!(pixel[1] == 0 && pixel[2] == 128);
    }

    #[test]
    fn test_red_hue_stays_in_range() {
        // Red just short of wrapping around sits at the top of the hue range
        let mut frame = RgbImage::new(60, 60);
        draw_square(&mut frame, (30, 30), 10, Rgb([255, 0, 20]));
        let (hsv, _) = hsv_frame(&frame, 0).unwrap();
        let mut marker = target();
        marker.range = ColorRange::new([170, 100, 100], [179, 255, 255]);
        assert!(ContourDetector.detect(&hsv, &marker, 10.0).unwrap().is_some());
        marker.range = ColorRange::new([0, 100, 100], [10, 255, 255]);
        assert!(ContourDetector.detect(&hsv, &marker, 10.0).unwrap().is_none());
    }

    #[test]
    fn test_largest_contour_wins() {
        let mut frame = RgbImage::new(100, 100);
        draw_square(&mut frame, (20, 20), 3, GREEN);
        draw_square(&mut frame, (70, 60), 5, GREEN);
        let (hsv, _) = hsv_frame(&frame, 0).unwrap();
        let detection = ContourDetector.detect(&hsv, &target(), 10.0).unwrap().unwrap();
        // Contours run through pixel centers, so an 11 pixel square is 10x10
        assert!((detection.area - 100.0).abs() < 0.001);
        assert!((detection.centroid.u - 70.0).abs() < 0.001);
        assert!((detection.centroid.v - 60.0).abs() < 0.001);
    }

    #[test]
    fn test_small_contours_ignored() {
        let mut frame = RgbImage::new(50, 50);
        draw_square(&mut frame, (25, 25), 3, GREEN);
        let (hsv, _) = hsv_frame(&frame, 0).unwrap();
        assert!(ContourDetector.detect(&hsv, &target(), 36.0).unwrap().is_none());
        assert!(ContourDetector.detect(&hsv, &target(), 35.0).unwrap().is_some());
    }

    #[test]
    fn test_speckles_opened_away() {
        let mut frame = RgbImage::new(50, 50);
        // Thinner than the opening kernel
        for u in 5..45 {
            frame.put_pixel(u, 10, GREEN);
            frame.put_pixel(u, 11, GREEN);
        }
        let (hsv, _) = hsv_frame(&frame, 0).unwrap();
        assert!(ContourDetector.detect(&hsv, &target(), 0.0).unwrap().is_none());
    }

    #[test]
    fn test_observe_all_markers() {
        let mut frame = RgbImage::new(320, 240);
        draw_square(&mut frame, (120, 100), 6, PINK);
        draw_square(&mut frame, (80, 100), 6, BLUE);
        draw_square(&mut frame, (250, 100), 8, GREEN);
        let observations = observe(&frame, &ContourDetector, &VisionConfig::default()).unwrap();
        let front = observations.front.unwrap();
        let rear = observations.rear.unwrap();
        let target = observations.target.unwrap();
        assert!((front.u - 120.0).abs() < 0.001 && (front.v - 100.0).abs() < 0.001);
        assert!((rear.u - 80.0).abs() < 0.001);
        assert!((target.u - 250.0).abs() < 0.001);
    }

    #[test]
    fn test_observe_missing_target() {
        let mut frame = RgbImage::new(320, 240);
        draw_square(&mut frame, (120, 100), 6, PINK);
        draw_square(&mut frame, (80, 100), 6, BLUE);
        let observations = observe(&frame, &ContourDetector, &VisionConfig::default()).unwrap();
        assert!(observations.front.is_some());
        assert!(observations.rear.is_some());
        assert!(observations.target.is_none());
    }

    #[test]
    fn test_observe_scales_down() {
        let mut frame = RgbImage::new(1280, 960);
        draw_square(&mut frame, (640, 480), 20, GREEN);
        let (_, ratio) = hsv_frame(&frame, 640).unwrap();
        assert!((ratio - 0.5).abs() < 0.0001);
        let observations = observe(&frame, &ContourDetector, &VisionConfig::default()).unwrap();
        let target = observations.target.unwrap();
        // Half size, so the centroid lands near (320, 240)
        assert!((target.u - 320.0).abs() < 1.0);
        assert!((target.v - 240.0).abs() < 1.0);
    }
}
