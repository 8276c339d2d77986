
use crate::error::{Result, invalid};

/// Advanced measurement slots P1..P12
pub const MEASUREMENT_SLOTS:usize = 12;

// Front-panel label, SCPI token for :MEASure:ADVanced:P<n>:TYPE
pub const MEASUREMENT_ITEMS:[(&str, &str); 66] = [
	("峰峰值", "PKPK"),
	("最大值", "MAX"),
	("最小值", "MIN"),
	("幅值", "AMPL"),
	("顶端值", "TOP"),
	("低端值", "BASE"),
	("L@T", "LEVELX"),
	("周期平局值", "CMEAN"),
	("平均值", "MEAN"),
	("标准差", "STDEV"),
	("周期标准差", "VSTD"),
	("均方根", "RMS"),
	("周期均方根", "CRMS"),
	("中位数", "MEDIAN"),
	("周期中位数", "CMEDIAN"),
	("下降过激", "OVSN"),
	("下降前激", "FPRE"),
	("上升过激", "OVSP"),
	("上升前激", "RPRE"),
	("周期", "PER"),
	("频率", "FREQ"),
	("最大值时间", "TMAX"),
	("最小值时间", "TMIN"),
	("正脉宽", "PWID"),
	("负脉宽", "NWID"),
	("正占空比", "DUTY"),
	("负占空比", "NDUTY"),
	("正脉冲串宽度", "WID"),
	("负脉冲串宽度", "NBWID"),
	("延时", "DELAY"),
	("T@M", "TIMEL"),
	("上升时间", "RISE"),
	("下降时间", "FALL"),
	("10-90%上升时间", "RISE10T90"),
	("90-10%下降时间", "FALL90T10"),
	("相邻周期抖动", "CCJ"),
	("直流正面积", "PAREA"),
	("直流负面积", "NAREA"),
	("直流有效面积", "AREA"),
	("直流绝对面积", "ABSAREA"),
	("周期数", "CYCLES"),
	("上升沿个数", "REDGES"),
	("下降沿个数", "FEDGES"),
	("边沿总数", "EDGES"),
	("正脉冲数", "PPULSES"),
	("负脉冲数", "NPULSES"),
	("相位", "PHA"),
	("时滞", "SKEW"),
	("FRFR", "FRR"),
	("FRFF", "FRF"),
	("FFFR", "FFR"),
	("FFFF", "FFF"),
	("FRLR", "LRR"),
	("FRLF", "LRF"),
	("FFLR", "LFR"),
	("FFLF", "LFF"),
	("交流正面积", "PACArea"),
	("交流负面积", "NACArea"),
	("交流有效面积", "ACArea"),
	("交流绝对面积", "ABSACArea"),
	("上升沿斜率", "PSLOPE"),
	("下降沿斜率", "NSLOPE"),
	("TSU@R", "TSR"),
	("TSU@F", "TSF"),
	("TH@R", "THR"),
	("TH@F", "THF"),
];

/// Items installed when the caller doesn't pick any
pub const DEFAULT_MEASUREMENTS:[&str; 11] = [
	"周期", "幅值", "频率", "正占空比", "正脉宽", "最大值", "最小值", "顶端值", "低端值",
	"上升沿斜率", "下降沿斜率",
];

/// Look up the SCPI token for a measurement, by front-panel label or by token
pub fn measurement_token(name:&str) -> Result<&'static str> {
	let name = name.trim();
	MEASUREMENT_ITEMS.iter()
		.find(|(label, token)| *label == name || token.eq_ignore_ascii_case(name))
		.map(|(_, token)| *token)
		.ok_or_else(|| invalid(format!("Unknown measurement item \"{}\"", name)))
}

/// Check a measurement slot number, 1 through 12
pub fn slot_ok(slot:usize) -> Result<()> {
	if (1..=MEASUREMENT_SLOTS).contains(&slot) { Ok(()) }
	else { Err(invalid(format!("measurement slot must be 1..={}, not {}", MEASUREMENT_SLOTS, slot))) }
}
