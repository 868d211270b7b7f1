use qss::Method;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MethodArg {
    /// First-order QSS
    Qss1,
    /// Second-order QSS
    #[default]
    Qss2,
    /// Third-order QSS
    Qss3,
    /// First-order linearly implicit QSS
    Liqss1,
    /// Second-order linearly implicit QSS
    Liqss2,
    /// Third-order linearly implicit QSS
    Liqss3,
    /// First-order QSS broadcasting the continuous trajectory
    Xqss1,
    /// Second-order QSS broadcasting the continuous trajectory
    Xqss2,
    /// Third-order QSS broadcasting the continuous trajectory
    Xqss3,
    /// Second-order LIQSS broadcasting the continuous trajectory
    Xliqss2,
    /// Second-order QSS with sign-flip relaxation
    Rqss2,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Qss1 => Method::qss1(),
            MethodArg::Qss2 => Method::qss2(),
            MethodArg::Qss3 => Method::qss3(),
            MethodArg::Liqss1 => Method::liqss1(),
            MethodArg::Liqss2 => Method::liqss2(),
            MethodArg::Liqss3 => Method::liqss3(),
            MethodArg::Xqss1 => Method::xqss1(),
            MethodArg::Xqss2 => Method::xqss2(),
            MethodArg::Xqss3 => Method::xqss3(),
            MethodArg::Xliqss2 => Method::xliqss2(),
            MethodArg::Rqss2 => Method::rqss2(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelArg {
    /// Exponential decay: dx/dt = -x
    Decay,
    /// Exponential decay driven by a sinusoidal input
    DecaySine,
    /// Achilles and the tortoise
    Achilles,
    /// Harmonic oscillator pair
    Oscillators,
    /// Bouncing ball with a ground zero-crossing
    BouncingBall,
    /// Stiff decay with a time-dependent forcing, a LIQSS showcase
    Stiff,
}

/// Simulate one of the built-in example models with a QSS method
#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct QssSimOptions {
    /// The model to simulate
    #[arg(long, value_enum)]
    pub model: ModelArg,

    /// The QSS method to integrate with
    #[arg(long, value_enum, default_value = "qss2")]
    pub method: MethodArg,

    /// Relative quantization tolerance
    #[arg(long)]
    pub rtol: Option<f64>,

    /// Absolute quantization tolerance
    #[arg(long)]
    pub atol: Option<f64>,

    /// Simulation start time
    #[arg(short = 's', long)]
    pub start_time: Option<f64>,

    /// Simulation stop time
    #[arg(short = 'f', long)]
    pub stop_time: Option<f64>,

    /// Uniform sampling interval for the output, in addition to the rows
    /// written at requantization events
    #[arg(long)]
    pub output_interval: Option<f64>,

    /// Simulation result output CSV file name. Default is to pretty-print
    /// to standard output.
    #[arg(short = 'o', long)]
    pub output_file: Option<std::path::PathBuf>,

    /// Refine zero-crossing roots by Newton iteration
    #[arg(long)]
    pub refine: bool,

    /// Clip requantization steps at trajectory inflection points
    #[arg(long)]
    pub inflection: bool,
}
