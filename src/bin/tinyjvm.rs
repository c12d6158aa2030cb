use clap::Parser;
use tinyjvm::{Vm, VmConfig};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Class search path of directories and jar files
    #[arg(short = 'p', long = "classpath")]
    classpath: Option<String>,

    /// Binary name of the class carrying `main([Ljava/lang/String;)V`
    main_class: String,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = VmConfig::new(cli.main_class);
    if let Some(cp) = cli.classpath {
        config = config.with_classpath(cp);
    }
    let vm = Vm::new(&config);

    let exit_code = match vm.start(&config) {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{err}");
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}
