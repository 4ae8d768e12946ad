//! Command lines for `raspivid` / `raspistill`.

use crate::camera::types::{Codec, Flip, StillOptions, StreamOptions, Tuning};

pub const STREAM_PROGRAM: &str = "raspivid";
pub const STILL_PROGRAM: &str = "raspistill";

/// Flags understood by both programs.
pub fn shared_args(tuning: &Tuning, width: u32, height: u32) -> Vec<String> {
    let mut args = vec![
        "--width".to_string(),
        width.to_string(),
        "--height".to_string(),
        height.to_string(),
    ];

    if tuning.rotation.degrees() != 0 {
        push(&mut args, "--rotation", tuning.rotation.degrees());
    }
    match tuning.flip {
        Flip::None => {}
        Flip::Horizontal => args.push("--hflip".to_string()),
        Flip::Vertical => args.push("--vflip".to_string()),
        Flip::Both => {
            args.push("--hflip".to_string());
            args.push("--vflip".to_string());
        }
    }

    push_opt(&mut args, "--shutter", tuning.shutter);
    push_opt(&mut args, "--sharpness", tuning.sharpness);
    push_opt(&mut args, "--contrast", tuning.contrast);
    push_opt(&mut args, "--brightness", tuning.brightness);
    push_opt(&mut args, "--saturation", tuning.saturation);
    push_opt(&mut args, "--ISO", tuning.iso);
    push_opt(&mut args, "--ev", tuning.exposure_compensation);
    push_opt(&mut args, "--exposure", tuning.exposure_mode.map(|m| m.as_arg()));
    push_opt(&mut args, "--awb", tuning.awb_mode.map(|m| m.as_arg()));
    push_opt(&mut args, "--analoggain", tuning.analog_gain);
    push_opt(&mut args, "--digitalgain", tuning.digital_gain);

    args
}

pub fn stream_args(options: &StreamOptions) -> Vec<String> {
    let mut args = vec![
        "--nopreview".to_string(),
        // run until killed
        "--timeout".to_string(),
        "0".to_string(),
    ];
    args.extend(shared_args(&options.tuning, options.width, options.height));

    push(&mut args, "--framerate", options.fps);
    if options.bit_rate > 0 {
        push(&mut args, "--bitrate", options.bit_rate);
    }
    push(&mut args, "--codec", options.codec.as_arg());
    if options.codec == Codec::H264 {
        // SPS/PPS ahead of every I-frame so late consumers can decode
        args.push("--inline".to_string());
    }
    if options.sensor_mode != 0 {
        push(&mut args, "--mode", options.sensor_mode);
    }
    push(&mut args, "--output", "-");

    args
}

pub fn still_args(options: &StillOptions) -> Vec<String> {
    let mut args = vec!["--nopreview".to_string()];
    args.extend(shared_args(&options.tuning, options.width, options.height));

    push(&mut args, "--timeout", options.delay_ms.max(1));
    push(&mut args, "--encoding", "jpg");
    push(&mut args, "--output", "-");

    args
}

fn push(args: &mut Vec<String>, flag: &str, value: impl ToString) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn push_opt<T: ToString>(args: &mut Vec<String>, flag: &str, value: Option<T>) {
    if let Some(value) = value {
        push(args, flag, value);
    }
}

#[cfg(test)]
#[path = "args_test.rs"]
mod args_test;
