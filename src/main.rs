#[macro_use]
extern crate log;

use snmp_session::configuration::{Configuration, Operation, Parser};
use snmp_session::{Session, SnmpError};

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let conf = Configuration::parse();
    let checked = conf
        .validate()
        .and_then(|_| Ok((conf.operation()?, conf.retry_policy()?)));
    let (operation, retry) = match checked {
        Ok(checked) => checked,
        Err(e) => {
            eprintln!("Configuration is broken: {}", e);
            return ExitCode::from(2);
        }
    };

    let session = match Session::bind(conf.local_socket(), conf.agent_socket()).await {
        Ok(session) => session.with_retry(retry),
        Err(e) => {
            eprintln!("Cannot bind to address {}: {}", conf.local_socket(), e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Querying agent {} with {} attempt(s)",
        conf.agent_socket(),
        session.retry().attempts()
    );

    match run(&conf, &session, operation).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.code() as u8)
        }
    }
}

async fn run(
    conf: &Configuration,
    session: &Session,
    operation: Operation,
) -> Result<(), SnmpError> {
    match operation {
        Operation::Get => {
            let value = session.get(&conf.community, &conf.oid).await?;
            println!("{} = {}", conf.oid, value);
        }
        Operation::SetInteger(value) => {
            session.set_integer(&conf.community, &conf.oid, value).await?;
            println!("{} = {}", conf.oid, value);
        }
        Operation::SetString(value) => {
            session.set_string(&conf.community, &conf.oid, &value).await?;
            println!("{} = {}", conf.oid, value);
        }
    }
    Ok(())
}
