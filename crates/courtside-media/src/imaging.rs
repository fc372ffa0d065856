//! `image` buffers as OpenCV matrices.

use image::RgbImage;
use opencv::{
    core::{Mat, Scalar, CV_8UC3},
    imgproc,
    prelude::*,
};

/// Copy an RGB frame into an owned 8-bit, 3-channel `Mat` (RGB order).
pub(crate) fn rgb_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let (width, height) = image.dimensions();
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(image.as_raw());
    Ok(mat)
}

/// Single-channel luma of an RGB frame.
pub(crate) fn gray_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let rgb = rgb_mat(image)?;
    let mut gray = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY)?;
    Ok(gray)
}

/// OpenCV's 8-bit HSV: hue in `[0, 180)`, saturation and value in `[0, 255]`.
pub(crate) fn hsv_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let rgb = rgb_mat(image)?;
    let mut hsv = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut hsv, imgproc::COLOR_RGB2HSV)?;
    Ok(hsv)
}
