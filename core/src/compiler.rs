//! Cut compiler: walks a `DrawSet`, scales coordinates to
//! device space, and drives a `CommandLayer` through the corresponding
//! 0x40 frames with the correct intercommand/intercurve pacing.

use log::debug;

use crate::command::{Command, CommandLayer, SubCmd};
use crate::error::{Error, Result};
use crate::path::{DrawOp, DrawSet, Document, Point};
use crate::transport::Transport;

/// Default drain between distinct cut commands (CLI flag `intercmd`).
pub const DEFAULT_INTERCOMMAND_MS: u64 = 100;
/// Default drain between within-cubic 0x40 frames (CLI flag `intercurve`).
pub const DEFAULT_INTERCURVE_MS: u64 = 5;

#[derive(Debug, Clone, Copy)]
struct Scaling {
    origin_x: u16,
    origin_y: u16,
    extent_w: u16,
    extent_h: u16,
    canvas_w: u32,
    canvas_h: u32,
}

impl Scaling {
    fn scale(&self, p: Point) -> (u16, u16) {
        let x = self.origin_x as f64 + (p.x / self.canvas_w as f64) * self.extent_w as f64;
        let y = self.origin_y as f64 + (p.y / self.canvas_h as f64) * self.extent_h as f64;
        (x as u16, y as u16)
    }
}

pub struct CutCompiler {
    scaling: Option<Scaling>,
    intercommand_ms: u64,
    intercurve_ms: u64,
}

impl CutCompiler {
    pub fn new() -> Self {
        CutCompiler {
            scaling: None,
            intercommand_ms: DEFAULT_INTERCOMMAND_MS,
            intercurve_ms: DEFAULT_INTERCURVE_MS,
        }
    }

    pub fn set_intercommand_ms(&mut self, ms: u64) {
        self.intercommand_ms = ms;
    }

    pub fn set_intercurve_ms(&mut self, ms: u64) {
        self.intercurve_ms = ms;
    }

    /// Set device-coordinate origin/extent and the SVG canvas dimensions
    /// they scale against. Fatal (`ScalingUnset`) if either canvas
    /// dimension is zero.
    pub fn set_scaling(
        &mut self,
        origin_x: u16,
        origin_y: u16,
        extent_w: u16,
        extent_h: u16,
        canvas_w: u32,
        canvas_h: u32,
    ) -> Result<()> {
        if canvas_w == 0 || canvas_h == 0 {
            return Err(Error::ScalingUnset);
        }
        self.scaling = Some(Scaling {
            origin_x,
            origin_y,
            extent_w,
            extent_h,
            canvas_w,
            canvas_h,
        });
        Ok(())
    }

    /// Cut every `DrawSet` in `document` in definition order, scaling
    /// against the mat boundaries already set via `set_scaling`.
    /// Short-circuits on the first sub-command failure.
    pub fn cut_all<T: Transport>(
        &mut self,
        layer: &mut CommandLayer,
        transport: &mut T,
        document: &Document,
    ) -> Result<usize> {
        layer.extra_drain(transport, 6 * self.intercommand_ms)?;
        let mut cut = 0;
        for draw_set in &document.draw_sets {
            self.cut_one(layer, transport, draw_set)?;
            cut += 1;
        }
        Ok(cut)
    }

    /// Cut a single `DrawSet`.
    pub fn cut_one<T: Transport>(
        &mut self,
        layer: &mut CommandLayer,
        transport: &mut T,
        draw_set: &DrawSet,
    ) -> Result<()> {
        let scaling = self.scaling.ok_or(Error::ScalingUnset)?;
        let mut last = (scaling.origin_x, scaling.origin_y);

        for op in draw_set.ops() {
            match op {
                DrawOp::Move(p) => {
                    let (x, y) = scaling.scale(*p);
                    layer.send(transport, Command::Move { sub_cmd: SubCmd::PenUp, x, y })?;
                    layer.extra_drain(transport, self.intercommand_ms)?;
                    last = (x, y);
                }
                DrawOp::Line(p) => {
                    let (x, y) = scaling.scale(*p);
                    layer.send(transport, Command::Move { sub_cmd: SubCmd::Line, x, y })?;
                    layer.extra_drain(transport, self.intercommand_ms)?;
                    last = (x, y);
                }
                DrawOp::Cubic(ctl1, ctl2, end) => {
                    let ctl1 = scaling.scale(*ctl1);
                    let ctl2 = scaling.scale(*ctl2);
                    let end = scaling.scale(*end);

                    debug!("cubic {:?} -> {:?} -> {:?} -> {:?}", last, ctl1, ctl2, end);

                    layer.send(transport, move_curve(last))?;
                    layer.extra_drain(transport, self.intercurve_ms)?;
                    layer.send(transport, move_curve(ctl1))?;
                    layer.extra_drain(transport, self.intercurve_ms)?;
                    layer.send(transport, move_curve(ctl2))?;
                    layer.extra_drain(transport, self.intercurve_ms)?;
                    layer.send(transport, move_curve(end))?;
                    layer.extra_drain(transport, self.intercommand_ms)?;

                    last = end;
                }
            }
        }
        Ok(())
    }
}

fn move_curve((x, y): (u16, u16)) -> Command {
    Command::Move { sub_cmd: SubCmd::Curve, x, y }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::NoiseGenerator;
    use crate::transport::MockTransport;

    fn fixed_layer() -> CommandLayer {
        CommandLayer::new(NoiseGenerator::fixed(10001))
    }

    fn queue_move_ack(t: &mut MockTransport, times: usize) {
        for _ in 0..times {
            t.queue_reply(&[4, 0, 0, 0, 0]);
        }
    }

    #[test]
    fn zero_canvas_dimension_is_scaling_unset() {
        let mut c = CutCompiler::new();
        let err = c.set_scaling(0, 0, 200, 200, 0, 200).unwrap_err();
        assert!(matches!(err, Error::ScalingUnset));
    }

    #[test]
    fn line_cut_emits_penup_then_line_frame() {
        let mut t = MockTransport::new();
        queue_move_ack(&mut t, 2);
        let mut layer = fixed_layer();
        let mut compiler = CutCompiler::new();
        compiler.set_scaling(0, 0, 200, 200, 200, 200).unwrap();

        let mut ds = DrawSet::new();
        ds.push(DrawOp::Move(Point::new(0.0, 0.0)));
        ds.push(DrawOp::Line(Point::new(100.0, 100.0)));

        compiler.cut_one(&mut layer, &mut t, &ds).unwrap();

        assert_eq!(t.sent_frames.len(), 2);
        assert_eq!(t.sent_frames[0][1], 0x40);
        assert_eq!(t.sent_frames[1][1], 0x40);

        let words0 = decrypt_frame(&t.sent_frames[0], SubCmd::PenUp);
        assert_eq!(words0, [10001, 0, 0]);
        let words1 = decrypt_frame(&t.sent_frames[1], SubCmd::Line);
        assert_eq!(words1, [10002, 100, 100]);
    }

    #[test]
    fn cubic_cut_emits_four_frames_in_order() {
        let mut t = MockTransport::new();
        queue_move_ack(&mut t, 5);
        let mut layer = fixed_layer();
        let mut compiler = CutCompiler::new();
        compiler.set_scaling(0, 0, 200, 200, 200, 200).unwrap();

        let mut ds = DrawSet::new();
        ds.push(DrawOp::Move(Point::new(0.0, 0.0)));
        ds.push(DrawOp::Cubic(
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(30.0, 30.0),
        ));

        compiler.cut_one(&mut layer, &mut t, &ds).unwrap();

        assert_eq!(t.sent_frames.len(), 5);
        // First frame: pen-up move to (0,0).
        assert_eq!(decrypt_frame(&t.sent_frames[0], SubCmd::PenUp), [10001, 0, 0]);
        // Remaining four: the Move, then the three cubic frames, all subCmd Curve=1.
        for f in &t.sent_frames[1..] {
            assert_eq!(f[1], 0x40);
        }
        let curve_points: Vec<[u32; 3]> = t.sent_frames[1..]
            .iter()
            .map(|f| decrypt_frame(f, SubCmd::Curve))
            .collect();
        assert_eq!(curve_points[0][1..], [0, 0]);
        assert_eq!(curve_points[1][1..], [10, 10]);
        assert_eq!(curve_points[2][1..], [20, 20]);
        assert_eq!(curve_points[3][1..], [30, 30]);
    }

    #[test]
    fn cubic_count_is_exactly_four_frames_no_extras() {
        let mut t = MockTransport::new();
        queue_move_ack(&mut t, 4);
        let mut layer = fixed_layer();
        let mut compiler = CutCompiler::new();
        compiler.set_scaling(0, 0, 10, 10, 10, 10).unwrap();

        let mut ds = DrawSet::new();
        ds.push(DrawOp::Move(Point::new(0.0, 0.0)));
        // Drop the leading Move's own frame by starting straight from a
        // cubic-only segment — still 4 frames for the one Cubic, plus 1
        // for the preceding Move = 5 total. Here we isolate by checking
        // only frame count after the Move.
        ds.push(DrawOp::Cubic(
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ));
        compiler.cut_one(&mut layer, &mut t, &ds).unwrap();
        assert_eq!(t.sent_frames.len(), 1 /* move */ + 4 /* cubic */);
    }

    #[test]
    fn eject_is_penup_move_to_origin() {
        // Confirms the Move command shape the eject step relies on.
        let cmd = Command::Move { sub_cmd: SubCmd::PenUp, x: 0, y: 0 };
        if let Command::Move { sub_cmd, x, y } = cmd {
            assert_eq!(x, 0);
            assert_eq!(y, 0);
            assert_eq!(sub_cmd, SubCmd::PenUp);
        } else {
            panic!("expected Move command");
        }
    }

    fn decrypt_frame(frame: &[u8], sub_cmd: SubCmd) -> [u32; 3] {
        let payload = &frame[2..14];
        let mut words = [
            u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
            u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]),
        ];
        crate::xxtea::decrypt(&mut words, &crate::xxtea::COMMAND_KEYS[sub_cmd as usize]);
        words
    }
}
