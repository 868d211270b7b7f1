//! Output recording into Arrow arrays.
//!
//! One row per requantization event, plus optional uniform sampling between
//! events through the variables' value-at-time probes.

use std::sync::Arc;

use arrow::{
    array::{ArrayRef, Float64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use qss::{Model, Simulation, VarIndex};

pub struct OutputState {
    names: Vec<String>,
    vars: Vec<VarIndex>,
    time: Vec<f64>,
    columns: Vec<Vec<f64>>,
    output_interval: Option<f64>,
    next_output: f64,
}

impl OutputState {
    /// Record the continuous values of `vars` (by kernel index), sampling
    /// uniformly at `output_interval` when given.
    pub fn new<M: Model>(
        sim: &Simulation<M>,
        vars: Vec<VarIndex>,
        output_interval: Option<f64>,
    ) -> Self {
        let names = vars
            .iter()
            .map(|&v| sim.variable(v).name().to_string())
            .collect();
        let start = sim.options().t_start;
        let columns = vec![Vec::new(); vars.len()];
        Self {
            names,
            vars,
            time: Vec::new(),
            columns,
            output_interval,
            next_output: output_interval.map_or(f64::INFINITY, |dt| start + dt),
        }
    }

    /// Write one row at time `t`.
    pub fn record<M: Model>(&mut self, t: f64, sim: &Simulation<M>) {
        self.time.push(t);
        for (column, &v) in self.columns.iter_mut().zip(&self.vars) {
            column.push(sim.sample(v, t));
        }
    }

    /// Write the uniformly sampled rows due strictly before `t`.
    pub fn record_samples_until<M: Model>(&mut self, t: f64, sim: &Simulation<M>) {
        while self.next_output < t {
            self.record(self.next_output, sim);
            // Interval is present whenever next_output is finite
            self.next_output += self.output_interval.unwrap_or(f64::INFINITY);
        }
    }

    /// Finish recording and build the result batch.
    pub fn finish(self) -> Result<RecordBatch, arrow::error::ArrowError> {
        let mut fields = vec![Field::new("time", DataType::Float64, false)];
        fields.extend(
            self.names
                .iter()
                .map(|name| Field::new(name, DataType::Float64, false)),
        );
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(Float64Array::from(self.time))];
        arrays.extend(
            self.columns
                .into_iter()
                .map(|column| Arc::new(Float64Array::from(column)) as ArrayRef),
        );
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
    }
}
