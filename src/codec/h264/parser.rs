use crate::codec::annexb::ebsp_to_rbsp;
use crate::codec::{FrameRate, Size};
use crate::utils::BitReader;
use crate::Result;

use super::types::SpsInfo;

const SAR_W_TABLE: [u32; 16] = [1, 12, 10, 16, 40, 24, 20, 32, 80, 18, 15, 64, 160, 4, 3, 2];
const SAR_H_TABLE: [u32; 16] = [1, 11, 11, 11, 33, 11, 11, 11, 33, 11, 11, 33, 99, 3, 2, 1];

/// Parses an H.264 sequence parameter set.
///
/// `nal` is the escaped NAL unit including its one-byte header.
pub fn parse_sps(nal: &[u8]) -> Result<SpsInfo> {
    let codec_mimetype = match nal.get(1..4) {
        Some(codec) => format!("avc1.{:02x}{:02x}{:02x}", codec[0], codec[1], codec[2]),
        None => return Err(crate::RemuxError::InvalidData("SPS too short".into())),
    };

    let rbsp = ebsp_to_rbsp(nal);
    let mut reader = BitReader::new(&rbsp);

    reader.read_byte()?; // NAL header
    let profile_idc = reader.read_byte()?;
    reader.read_byte()?; // constraint_set flags + reserved_zero_2bits
    let level_idc = reader.read_byte()?;
    reader.skip_ueg()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    let mut chroma_format = 420;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;

    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 144
    ) {
        chroma_format_idc = reader.read_ueg()?;
        if chroma_format_idc == 3 {
            reader.skip_bits(1)?; // separate_colour_plane_flag
        }
        if chroma_format_idc <= 3 {
            chroma_format = [0, 420, 422, 444][chroma_format_idc as usize];
        }

        bit_depth_luma = (reader.read_ueg()? as u8).saturating_add(8);
        bit_depth_chroma = (reader.read_ueg()? as u8).saturating_add(8);
        reader.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if reader.read_bool()? {
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                if reader.read_bool()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.skip_ueg()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = reader.read_ueg()?;
    if pic_order_cnt_type == 0 {
        reader.skip_ueg()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        reader.skip_bits(1)?; // delta_pic_order_always_zero_flag
        reader.read_seg()?; // offset_for_non_ref_pic
        reader.read_seg()?; // offset_for_top_to_bottom_field
        let cycle = reader.read_ueg()?;
        for _ in 0..cycle {
            reader.read_seg()?;
        }
    }
    let ref_frames = reader.read_ueg()?;
    reader.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = reader.read_ueg()?;
    let pic_height_in_map_units_minus1 = reader.read_ueg()?;

    let frame_mbs_only_flag = reader.read_bits(1)?;
    if frame_mbs_only_flag == 0 {
        reader.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.skip_bits(1)?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if reader.read_bool()? {
        crop_left = reader.read_ueg()?;
        crop_right = reader.read_ueg()?;
        crop_top = reader.read_ueg()?;
        crop_bottom = reader.read_ueg()?;
    }

    let mut sar = Size::new(1, 1);
    let mut frame_rate = FrameRate {
        fixed: true,
        fps: 0.0,
        fps_num: 0,
        fps_den: 0,
    };

    if reader.read_bool()? {
        // aspect_ratio_info_present_flag
        if reader.read_bool()? {
            let aspect_ratio_idc = reader.read_byte()?;
            if aspect_ratio_idc > 0 && aspect_ratio_idc < 16 {
                let idx = aspect_ratio_idc as usize - 1;
                sar = Size::new(SAR_W_TABLE[idx], SAR_H_TABLE[idx]);
            } else if aspect_ratio_idc == 255 {
                sar = Size::new(reader.read_bits(16)?, reader.read_bits(16)?);
            }
        }
        // overscan_info_present_flag
        if reader.read_bool()? {
            reader.skip_bits(1)?;
        }
        // video_signal_type_present_flag
        if reader.read_bool()? {
            reader.skip_bits(4)?;
            if reader.read_bool()? {
                reader.skip_bits(24)?;
            }
        }
        // chroma_loc_info_present_flag
        if reader.read_bool()? {
            reader.skip_ueg()?;
            reader.skip_ueg()?;
        }
        // timing_info_present_flag
        if reader.read_bool()? {
            let num_units_in_tick = reader.read_bits(32)?;
            let time_scale = reader.read_bits(32)?;
            let fixed = reader.read_bool()?;
            let fps_den = num_units_in_tick.saturating_mul(2);
            frame_rate = FrameRate {
                fixed,
                fps: if fps_den > 0 {
                    time_scale as f64 / fps_den as f64
                } else {
                    0.0
                },
                fps_num: time_scale,
                fps_den,
            };
        }
    }

    let sar_scale = if sar.width != 1 || sar.height != 1 {
        sar.width as f64 / sar.height as f64
    } else {
        1.0
    };

    let (crop_unit_x, crop_unit_y) = if chroma_format_idc == 0 {
        (1, 2 - frame_mbs_only_flag)
    } else {
        let sub_wc = if chroma_format_idc == 3 { 1 } else { 2 };
        let sub_hc = if chroma_format_idc == 1 { 2 } else { 1 };
        (sub_wc, sub_hc * (2 - frame_mbs_only_flag))
    };

    let codec_width = pic_width_in_mbs_minus1
        .saturating_add(1)
        .saturating_mul(16)
        .saturating_sub(crop_left.saturating_add(crop_right).saturating_mul(crop_unit_x));
    let codec_height = pic_height_in_map_units_minus1
        .saturating_add(1)
        .saturating_mul(16 * (2 - frame_mbs_only_flag))
        .saturating_sub(crop_top.saturating_add(crop_bottom).saturating_mul(crop_unit_y));
    let present_width = (codec_width as f64 * sar_scale).ceil() as u32;

    Ok(SpsInfo {
        codec_mimetype,
        profile_idc,
        level_idc,
        profile_string: profile_string(profile_idc).to_string(),
        level_string: format!("{:.1}", level_idc as f64 / 10.0),
        chroma_format_idc,
        bit_depth_luma,
        bit_depth_chroma,
        ref_frames,
        chroma_format,
        chroma_format_string: chroma_format_string(chroma_format).to_string(),
        frame_rate,
        sar_ratio: sar,
        codec_size: Size::new(codec_width, codec_height),
        present_size: Size::new(present_width, codec_height),
    })
}

fn skip_scaling_list(reader: &mut BitReader, count: usize) -> Result<()> {
    let mut last_scale: i32 = 8;
    let mut next_scale = 8;
    for _ in 0..count {
        if next_scale != 0 {
            let delta_scale = reader.read_seg()?;
            next_scale = last_scale.wrapping_add(delta_scale).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

pub fn profile_string(profile_idc: u8) -> &'static str {
    match profile_idc {
        66 => "Baseline",
        77 => "Main",
        88 => "Extended",
        100 => "High",
        110 => "High10",
        122 => "High422",
        244 => "High444",
        _ => "Unknown",
    }
}

pub fn chroma_format_string(chroma: u32) -> &'static str {
    match chroma {
        420 => "4:2:0",
        422 => "4:2:2",
        444 => "4:4:4",
        _ => "Unknown",
    }
}
