use crate::codec::annexb::ebsp_to_rbsp;
use crate::codec::{FrameRate, Size};
use crate::utils::BitReader;
use crate::Result;

use super::types::{PpsInfo, SpsInfo, VpsInfo};

const SAR_W_TABLE: [u32; 16] = [1, 12, 10, 16, 40, 24, 20, 32, 80, 18, 15, 64, 160, 4, 3, 2];
const SAR_H_TABLE: [u32; 16] = [1, 11, 11, 11, 33, 11, 11, 11, 33, 11, 11, 33, 99, 3, 2, 1];

/// Opens an RBSP reader positioned after the two-byte NAL header.
fn rbsp_reader(rbsp: &[u8]) -> Result<BitReader<'_>> {
    let mut reader = BitReader::new(rbsp);
    reader.skip_bits(16)?;
    Ok(reader)
}

/// Parses the leading fields of a video parameter set.
pub fn parse_vps(nal: &[u8]) -> Result<VpsInfo> {
    let rbsp = ebsp_to_rbsp(nal);
    let mut reader = rbsp_reader(&rbsp)?;

    reader.skip_bits(4)?; // vps_video_parameter_set_id
    reader.skip_bits(2)?; // base_layer_internal/available flags
    reader.skip_bits(6)?; // vps_max_layers_minus1
    let max_sub_layers_minus1 = reader.read_bits(3)? as u8;
    let temporal_id_nested = reader.read_bool()?;

    Ok(VpsInfo {
        num_temporal_layers: max_sub_layers_minus1 + 1,
        temporal_id_nested,
    })
}

/// Parses an H.265 sequence parameter set, including VUI frame timing,
/// sample aspect ratio and the conformance window.
pub fn parse_sps(nal: &[u8]) -> Result<SpsInfo> {
    let rbsp = ebsp_to_rbsp(nal);
    let mut reader = rbsp_reader(&rbsp)?;

    reader.skip_bits(4)?; // sps_video_parameter_set_id
    let max_sub_layers_minus1 = reader.read_bits(3)?;
    reader.skip_bits(1)?; // sps_temporal_id_nesting_flag

    // profile_tier_level
    let general_profile_space = reader.read_bits(2)? as u8;
    let general_tier_flag = reader.read_bool()?;
    let general_profile_idc = reader.read_bits(5)? as u8;
    let mut general_profile_compatibility_flags = [0u8; 4];
    for flag in general_profile_compatibility_flags.iter_mut() {
        *flag = reader.read_byte()?;
    }
    let mut general_constraint_indicator_flags = [0u8; 6];
    for flag in general_constraint_indicator_flags.iter_mut() {
        *flag = reader.read_byte()?;
    }
    let general_level_idc = reader.read_byte()?;

    let mut sub_layer_profile_present = Vec::with_capacity(max_sub_layers_minus1 as usize);
    let mut sub_layer_level_present = Vec::with_capacity(max_sub_layers_minus1 as usize);
    for _ in 0..max_sub_layers_minus1 {
        sub_layer_profile_present.push(reader.read_bool()?);
        sub_layer_level_present.push(reader.read_bool()?);
    }
    if max_sub_layers_minus1 > 0 {
        for _ in max_sub_layers_minus1..8 {
            reader.skip_bits(2)?;
        }
    }
    for i in 0..max_sub_layers_minus1 as usize {
        if sub_layer_profile_present[i] {
            reader.skip_bits(88)?;
        }
        if sub_layer_level_present[i] {
            reader.skip_bits(8)?;
        }
    }

    reader.skip_ueg()?; // sps_seq_parameter_set_id
    let chroma_format_idc = reader.read_ueg()?;
    if chroma_format_idc == 3 {
        reader.skip_bits(1)?; // separate_colour_plane_flag
    }
    let pic_width_in_luma_samples = reader.read_ueg()?;
    let pic_height_in_luma_samples = reader.read_ueg()?;

    let (mut left_offset, mut right_offset, mut top_offset, mut bottom_offset) = (0, 0, 0, 0);
    if reader.read_bool()? {
        left_offset = reader.read_ueg()?;
        right_offset = reader.read_ueg()?;
        top_offset = reader.read_ueg()?;
        bottom_offset = reader.read_ueg()?;
    }

    let bit_depth_luma_minus8 = reader.read_ueg()?.min(8) as u8;
    let bit_depth_chroma_minus8 = reader.read_ueg()?.min(8) as u8;
    let log2_max_pic_order_cnt_lsb_minus4 = reader.read_ueg()?;

    let sub_layer_ordering_info_present = reader.read_bool()?;
    let first = if sub_layer_ordering_info_present {
        0
    } else {
        max_sub_layers_minus1
    };
    for _ in first..=max_sub_layers_minus1 {
        reader.skip_ueg()?; // sps_max_dec_pic_buffering_minus1
        reader.skip_ueg()?; // sps_max_num_reorder_pics
        reader.skip_ueg()?; // sps_max_latency_increase_plus1
    }

    // log2_min_luma_coding_block_size_minus3 .. max_transform_hierarchy_depth_intra
    for _ in 0..6 {
        reader.skip_ueg()?;
    }

    if reader.read_bool()? && reader.read_bool()? {
        // scaling_list_enabled_flag + sps_scaling_list_data_present_flag
        for size_id in 0..4u32 {
            let matrices = if size_id == 3 { 2 } else { 6 };
            for _ in 0..matrices {
                if !reader.read_bool()? {
                    reader.skip_ueg()?; // scaling_list_pred_matrix_id_delta
                } else {
                    let coef_num = 64u32.min(1 << (4 + (size_id << 1)));
                    if size_id > 1 {
                        reader.read_seg()?;
                    }
                    for _ in 0..coef_num {
                        reader.read_seg()?;
                    }
                }
            }
        }
    }

    reader.skip_bits(1)?; // amp_enabled_flag
    reader.skip_bits(1)?; // sample_adaptive_offset_enabled_flag
    if reader.read_bool()? {
        // pcm_enabled_flag
        reader.skip_bits(8)?;
        reader.skip_ueg()?;
        reader.skip_ueg()?;
        reader.skip_bits(1)?;
    }

    let num_short_term_ref_pic_sets = reader.read_ueg()?;
    let mut num_delta_pocs = 0u32;
    for i in 0..num_short_term_ref_pic_sets {
        let inter_ref_pic_set_prediction = i != 0 && reader.read_bool()?;
        if inter_ref_pic_set_prediction {
            reader.skip_bits(1)?; // delta_rps_sign
            reader.skip_ueg()?; // abs_delta_rps_minus1
            let mut next_num_delta_pocs = 0;
            for _ in 0..=num_delta_pocs {
                let used_by_curr_pic = reader.read_bool()?;
                let use_delta = !used_by_curr_pic && reader.read_bool()?;
                if used_by_curr_pic || use_delta {
                    next_num_delta_pocs += 1;
                }
            }
            num_delta_pocs = next_num_delta_pocs;
        } else {
            let num_negative_pics = reader.read_ueg()?;
            let num_positive_pics = reader.read_ueg()?;
            num_delta_pocs = num_negative_pics.saturating_add(num_positive_pics);
            for _ in 0..num_negative_pics {
                reader.skip_ueg()?;
                reader.skip_bits(1)?;
            }
            for _ in 0..num_positive_pics {
                reader.skip_ueg()?;
                reader.skip_bits(1)?;
            }
        }
    }

    if reader.read_bool()? {
        // long_term_ref_pics_present_flag
        let num_long_term_ref_pics_sps = reader.read_ueg()?;
        for _ in 0..num_long_term_ref_pics_sps {
            reader.skip_bits(log2_max_pic_order_cnt_lsb_minus4 + 4)?;
            reader.skip_bits(1)?;
        }
    }

    let mut min_spatial_segmentation_idc = 0;
    let mut sar = Size::new(1, 1);
    let mut frame_rate = FrameRate {
        fixed: false,
        fps: 1.0,
        fps_num: 1,
        fps_den: 1,
    };

    reader.skip_bits(1)?; // sps_temporal_mvp_enabled_flag
    reader.skip_bits(1)?; // strong_intra_smoothing_enabled_flag
    if reader.read_bool()? {
        // vui_parameters_present_flag
        if reader.read_bool()? {
            let aspect_ratio_idc = reader.read_byte()?;
            if aspect_ratio_idc > 0 && aspect_ratio_idc <= 16 {
                let idx = aspect_ratio_idc as usize - 1;
                sar = Size::new(SAR_W_TABLE[idx], SAR_H_TABLE[idx]);
            } else if aspect_ratio_idc == 255 {
                sar = Size::new(reader.read_bits(16)?, reader.read_bits(16)?);
            }
        }
        if reader.read_bool()? {
            reader.skip_bits(1)?; // overscan_appropriate_flag
        }
        if reader.read_bool()? {
            // video_signal_type_present_flag
            reader.skip_bits(4)?;
            if reader.read_bool()? {
                reader.skip_bits(24)?;
            }
        }
        if reader.read_bool()? {
            reader.skip_ueg()?;
            reader.skip_ueg()?;
        }
        reader.skip_bits(1)?; // neutral_chroma_indication_flag
        reader.skip_bits(1)?; // field_seq_flag
        reader.skip_bits(1)?; // frame_field_info_present_flag
        if reader.read_bool()? {
            // default_display_window_flag
            for _ in 0..4 {
                reader.skip_ueg()?;
            }
        }
        if reader.read_bool()? {
            // vui_timing_info_present_flag
            let fps_den = reader.read_bits(32)?;
            let fps_num = reader.read_bits(32)?;
            frame_rate.fps_den = fps_den;
            frame_rate.fps_num = fps_num;
            frame_rate.fps = if fps_den > 0 {
                fps_num as f64 / fps_den as f64
            } else {
                0.0
            };
            if reader.read_bool()? {
                reader.skip_ueg()?; // vui_num_ticks_poc_diff_one_minus1
            }
            if reader.read_bool()? {
                frame_rate.fixed = skip_hrd_parameters(&mut reader, max_sub_layers_minus1)?;
            }
        }
        if reader.read_bool()? {
            // bitstream_restriction_flag
            reader.skip_bits(3)?;
            min_spatial_segmentation_idc = reader.read_ueg()?;
            for _ in 0..4 {
                reader.skip_ueg()?;
            }
        }
    }

    let sub_wc = if chroma_format_idc == 1 || chroma_format_idc == 2 { 2 } else { 1 };
    let sub_hc = if chroma_format_idc == 1 { 2 } else { 1 };
    let codec_width = pic_width_in_luma_samples
        .saturating_sub(left_offset.saturating_add(right_offset).saturating_mul(sub_wc));
    let codec_height = pic_height_in_luma_samples
        .saturating_sub(top_offset.saturating_add(bottom_offset).saturating_mul(sub_hc));
    let sar_scale = if sar.width != 1 || sar.height != 1 {
        sar.width as f64 / sar.height as f64
    } else {
        1.0
    };

    Ok(SpsInfo {
        codec_mimetype: format!("hvc1.{}.1.L{}.B0", general_profile_idc, general_level_idc),
        profile_string: profile_string(general_profile_idc).to_string(),
        level_string: format!("{:.1}", general_level_idc as f64 / 30.0),
        general_profile_space,
        general_tier_flag,
        general_profile_idc,
        general_profile_compatibility_flags,
        general_constraint_indicator_flags,
        general_level_idc,
        min_spatial_segmentation_idc,
        constant_frame_rate: 0,
        chroma_format_idc,
        chroma_format_string: chroma_format_string(chroma_format_idc).to_string(),
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        ref_frames: 1,
        frame_rate,
        sar_ratio: sar,
        codec_size: Size::new(codec_width, codec_height),
        present_size: Size::new((codec_width as f64 * sar_scale).ceil() as u32, codec_height),
    })
}

/// Skips `hrd_parameters(1, max_sub_layers_minus1)` and returns the last
/// `fixed_pic_rate_general_flag`.
fn skip_hrd_parameters(reader: &mut BitReader, max_sub_layers_minus1: u32) -> Result<bool> {
    let nal_hrd = reader.read_bool()?;
    let vcl_hrd = reader.read_bool()?;
    let mut sub_pic_hrd_params = false;
    if nal_hrd || vcl_hrd {
        sub_pic_hrd_params = reader.read_bool()?;
        if sub_pic_hrd_params {
            reader.skip_bits(8 + 5 + 1 + 5)?;
        }
        reader.skip_bits(8)?; // bit_rate_scale, cpb_size_scale
        if sub_pic_hrd_params {
            reader.skip_bits(4)?;
        }
        reader.skip_bits(15)?;
    }

    let mut fixed = false;
    for _ in 0..=max_sub_layers_minus1 {
        let fixed_pic_rate_general = reader.read_bool()?;
        fixed = fixed_pic_rate_general;
        let fixed_pic_rate_within_cvs = fixed_pic_rate_general || reader.read_bool()?;
        let mut low_delay_hrd = false;
        if fixed_pic_rate_within_cvs {
            reader.skip_ueg()?; // elemental_duration_in_tc_minus1
        } else {
            low_delay_hrd = reader.read_bool()?;
        }
        let cpb_cnt = if low_delay_hrd { 1 } else { reader.read_ueg()?.saturating_add(1) };
        for present in [nal_hrd, vcl_hrd] {
            if present {
                for _ in 0..cpb_cnt {
                    reader.skip_ueg()?;
                    reader.skip_ueg()?;
                    if sub_pic_hrd_params {
                        reader.skip_ueg()?;
                        reader.skip_ueg()?;
                    }
                }
                reader.skip_bits(1)?; // cbr_flag
            }
        }
    }
    Ok(fixed)
}

/// Parses the picture parameter set fields needed for `hvcC`.
pub fn parse_pps(nal: &[u8]) -> Result<PpsInfo> {
    let rbsp = ebsp_to_rbsp(nal);
    let mut reader = rbsp_reader(&rbsp)?;

    reader.skip_ueg()?; // pps_pic_parameter_set_id
    reader.skip_ueg()?; // pps_seq_parameter_set_id
    reader.skip_bits(1 + 1 + 3 + 1 + 1)?;
    reader.skip_ueg()?; // num_ref_idx_l0_default_active_minus1
    reader.skip_ueg()?; // num_ref_idx_l1_default_active_minus1
    reader.read_seg()?; // init_qp_minus26
    reader.skip_bits(2)?; // constrained_intra_pred_flag, transform_skip_enabled_flag
    if reader.read_bool()? {
        reader.skip_ueg()?; // diff_cu_qp_delta_depth
    }
    reader.read_seg()?; // pps_cb_qp_offset
    reader.read_seg()?; // pps_cr_qp_offset
    reader.skip_bits(4)?;
    let tiles_enabled = reader.read_bool()?;
    let entropy_coding_sync_enabled = reader.read_bool()?;

    let parallelism_type = match (entropy_coding_sync_enabled, tiles_enabled) {
        (true, true) => 0,
        (true, false) => 3,
        (false, true) => 2,
        (false, false) => 1,
    };
    Ok(PpsInfo { parallelism_type })
}

pub fn profile_string(profile_idc: u8) -> &'static str {
    match profile_idc {
        1 => "Main",
        2 => "Main10",
        3 => "MainSP",
        4 => "Rext",
        9 => "SCC",
        _ => "Unknown",
    }
}

pub fn chroma_format_string(chroma_format_idc: u32) -> &'static str {
    match chroma_format_idc {
        0 => "4:0:0",
        1 => "4:2:0",
        2 => "4:2:2",
        3 => "4:4:4",
        _ => "Unknown",
    }
}
