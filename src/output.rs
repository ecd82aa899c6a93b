//! Output files: an append-mode `.info` table plus raw little-endian
//! binary arrays per frame, named `<model>.<field>.<frame>` with a
//! zero-padded 6-digit frame number.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use crate::config::Param;
use crate::error::Result;
use crate::simulation::State;

fn write_f64s<I: IntoIterator<Item = f64>>(path: &str, values: I) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

fn write_i32s<I: IntoIterator<Item = i32>>(path: &str, values: I) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Write one output frame.
pub fn write_output(param: &Param, var: &State, wall_time: f64) -> Result<()> {
    let model = &param.sim.modelname;

    let info = OpenOptions::new()
        .create(true)
        .append(var.frame != 0)
        .write(true)
        .truncate(var.frame == 0)
        .open(format!("{}.info", model))?;
    let mut info = BufWriter::new(info);
    writeln!(
        info,
        "{:6}\t{:10}\t{:12.6e}\t{:12.4e}\t{:12.6e}\t{:8}\t{:8}\t{:8}",
        var.frame,
        var.steps,
        var.time,
        var.dt,
        wall_time,
        var.mesh.nnode(),
        var.mesh.nelem(),
        var.mesh.nseg()
    )?;
    info.flush()?;

    let frame = var.frame;
    write_f64s(
        &format!("{}.coord.{:06}", model, frame),
        var.mesh.coord.iter().flatten().copied(),
    )?;
    write_i32s(
        &format!("{}.connectivity.{:06}", model, frame),
        var.mesh.connectivity.iter().flatten().map(|&n| n as i32),
    )?;
    write_f64s(
        &format!("{}.temperature.{:06}", model, frame),
        var.temperature.iter().copied(),
    )?;
    write_f64s(
        &format!("{}.velocity.{:06}", model, frame),
        var.vel.iter().flatten().copied(),
    )?;
    write_f64s(
        &format!("{}.stress.{:06}", model, frame),
        var.stress.iter().flatten().copied(),
    )?;
    write_f64s(
        &format!("{}.strain.{:06}", model, frame),
        var.strain.iter().flatten().copied(),
    )?;
    write_f64s(
        &format!("{}.plstrain.{:06}", model, frame),
        var.plstrain.iter().copied(),
    )?;

    Ok(())
}
