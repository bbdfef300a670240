//! C++ for Vitis-style HLS: a `top_function` calling backend primitives.

use super::Emitter;
use crate::lower::{Instruction, Location, Primitive, Program};

/// Default size of the placeholder weight array: the largest conv the
/// search space can produce, 128x128 channels with a 5x5 kernel.
pub const MAX_WEIGHT_SIZE: usize = 128 * 128 * 5 * 5;
pub const MAX_BIAS_SIZE: usize = 1024;

const INDENT: &str = "    ";

/// Renders a single HLS translation unit.
///
/// Conv and linear calls receive the placeholder `dummy_weights` and
/// `dummy_bias` arrays right after their two buffers, so synthesis sizes
/// the memories and DSPs as if real parameters were embedded.
#[derive(Clone, Debug)]
pub struct HlsEmitter {
    pub max_weight_size: usize,
    pub max_bias_size: usize,
}

impl Default for HlsEmitter {
    fn default() -> Self {
        Self {
            max_weight_size: MAX_WEIGHT_SIZE,
            max_bias_size: MAX_BIAS_SIZE,
        }
    }
}

impl HlsEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(&self, program: &Program, out: &mut Vec<String>) {
        out.push("// Auto-generated HLS design".to_string());
        out.push(format!("// Architecture: {}", program.summary));
        out.push("#include <cstddef>".to_string());
        out.push(String::new());
        out.push(format!("#define MAX_FEAT_SIZE {}", program.plan.capacity));
        out.push(format!("#define MAX_WEIGHT_SIZE {}", self.max_weight_size));
        out.push(format!("#define MAX_BIAS_SIZE {}", self.max_bias_size));
        out.push(String::new());
    }

    fn declarations(&self, out: &mut Vec<String>) {
        out.push("// Backend primitives".to_string());
        for primitive in Primitive::ALL {
            out.push(declaration(primitive));
        }
        out.push(String::new());
        out.push("// Placeholder parameters for synthesis".to_string());
        out.push("const float dummy_weights[MAX_WEIGHT_SIZE] = { 0.1f };".to_string());
        out.push("const float dummy_bias[MAX_BIAS_SIZE] = { 0.1f };".to_string());
        out.push(String::new());
    }

    fn storage(&self, program: &Program, out: &mut Vec<String>) {
        let buffers = program.plan.buffers();
        for buffer in buffers {
            out.push(format!(
                "{}static float {}[MAX_FEAT_SIZE];",
                INDENT,
                buffer.name()
            ));
        }
        for buffer in buffers {
            out.push(format!(
                "{}#pragma HLS BIND_STORAGE variable={} type=RAM_2P",
                INDENT,
                buffer.name()
            ));
        }
    }
}

impl Emitter for HlsEmitter {
    fn emit(&self, program: &Program) -> Vec<String> {
        let mut out = Vec::new();
        self.header(program, &mut out);
        self.declarations(&mut out);

        out.push("void top_function(float* input_gmem, float* output_gmem) {".to_string());
        out.push(format!(
            "{}#pragma HLS INTERFACE m_axi port=input_gmem bundle=gmem0 depth=MAX_FEAT_SIZE",
            INDENT
        ));
        out.push(format!(
            "{}#pragma HLS INTERFACE m_axi port=output_gmem bundle=gmem1 depth=MAX_FEAT_SIZE",
            INDENT
        ));
        out.push(format!("{}#pragma HLS INTERFACE s_axilite port=return", INDENT));
        out.push(String::new());
        self.storage(program, &mut out);

        let mut current_block = None;
        for inst in &program.instructions {
            match inst {
                Instruction::Load { dst, count } => {
                    out.push(String::new());
                    out.push(stage_comment("Load input", program, Location::Load));
                    out.push(copy_loop(*count, dst.name(), "input_gmem"));
                }
                Instruction::Store { src, count } => {
                    out.push(String::new());
                    out.push(stage_comment("Store output", program, Location::Store));
                    out.push(copy_loop(*count, "output_gmem", src.name()));
                }
                _ => {
                    let Some(site) = inst.site() else { continue };
                    if current_block != Some(site.index) {
                        current_block = Some(site.index);
                        let location = Location::Block {
                            index: site.index,
                            kind: site.kind,
                        };
                        let mut comment = format!(
                            "{}// Block {}: {} ({} live",
                            INDENT, site.index, site.kind, site.live
                        );
                        if clamped(program, location) {
                            comment.push_str(", clamped to capacity");
                        }
                        comment.push(')');
                        out.push(String::new());
                        out.push(comment);
                    }
                    out.push(block_line(inst));
                }
            }
        }
        out.push("}".to_string());
        out
    }
}

fn declaration(primitive: Primitive) -> String {
    let mut params = vec!["float* input".to_string(), "float* output".to_string()];
    if primitive.takes_weights() {
        params.push("const float* weights".to_string());
        params.push("const float* bias".to_string());
    }
    params.extend(primitive.params().iter().map(|p| format!("int {}", p)));
    format!("void {}({});", primitive.name(), params.join(", "))
}

fn block_line(inst: &Instruction) -> String {
    match inst {
        Instruction::Call {
            primitive,
            src,
            dst,
            args,
            ..
        } => {
            let mut operands = vec![src.name().to_string(), dst.name().to_string()];
            if primitive.takes_weights() {
                operands.push("dummy_weights".to_string());
                operands.push("dummy_bias".to_string());
            }
            operands.extend(args.iter().map(|a| a.to_string()));
            format!("{}{}({});", INDENT, primitive.name(), operands.join(", "))
        }
        Instruction::Copy {
            src, dst, count, ..
        } => copy_loop(*count, dst.name(), src.name()),
        Instruction::Reinterpret { features, .. } => format!(
            "{}// flatten: storage reinterpreted as {} features",
            INDENT, features
        ),
        Instruction::Load { .. } | Instruction::Store { .. } => String::new(),
    }
}

fn copy_loop(count: usize, dst: &str, src: &str) -> String {
    format!(
        "{}for (int i = 0; i < {}; ++i) {}[i] = {}[i];",
        INDENT, count, dst, src
    )
}

fn stage_comment(label: &str, program: &Program, location: Location) -> String {
    if clamped(program, location) {
        format!("{}// {} (clamped to capacity)", INDENT, label)
    } else {
        format!("{}// {}", INDENT, label)
    }
}

fn clamped(program: &Program, location: Location) -> bool {
    program.warnings.iter().any(|w| w.location == location)
}
