//! Issue invoices, import a camt.053 statement and print the resulting ledger
//!
//! Run with `RUST_LOG=payment_ledger=debug` to see every ledger step.

use chrono::{TimeZone, Utc};
use payment_ledger::utils::MemoryStorage;
use payment_ledger::{
    BankReconciliationService, GroupBy, LedgerConfig, Money, NewPayment, PartyRef, PaymentLedger,
    PaymentType, Registration, ReportQuery,
};
use std::collections::BTreeSet;

fn invoice(payer: PartyRef, title: &str, debts: &[&str], cents: i64) -> NewPayment {
    NewPayment {
        payment_type: PaymentType::Invoice,
        title: title.to_string(),
        message: String::new(),
        payer,
        debt_center: Some(PartyRef::new("events", "Events")),
        debt_ids: debts.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
        total: Money::from_cents(cents),
        reference: None,
        created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
    }
}

fn entry(id: &str, amount: &str, reference: &str) -> String {
    format!(
        r#"<Ntry>
      <CdtDbtInd>CRDT</CdtDbtInd>
      <BookgDt><Dt>2024-03-05</Dt></BookgDt>
      <ValDt><Dt>2024-03-05</Dt></ValDt>
      <NtryDtls><TxDtls>
        <Refs><MsgId>{id}</MsgId></Refs>
        <AmtDtls><TxAmt><Amt Ccy="EUR">{amount}</Amt></TxAmt></AmtDtls>
        <RltdPties><Dbtr><Nm>Payer {id}</Nm></Dbtr></RltdPties>
        <RmtInf><Strd><CdtrRefInf><Ref>{reference}</Ref></CdtrRefInf></Strd></RmtInf>
      </TxDtls></NtryDtls>
    </Ntry>"#
    )
}

fn statement(entries: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
  <BkToCstmrAcctRpt><Rpt>
    <Id>DEMO-2024-03-05</Id>
    <CreDtTm>2024-03-06T06:00:00Z</CreDtTm>
    <Acct>
      <Id><IBAN>FI2112345600000785</IBAN></Id>
      <Ccy>EUR</Ccy>
      <Svcr><FinInstnId><BIC>NDEAFIHH</BIC><Nm>Nordea Bank Abp</Nm><PstlAdr><StrtNm>Satamaradankatu 5</StrtNm></PstlAdr></FinInstnId></Svcr>
    </Acct>
    <Bal><Tp><CdOrPrtry><Cd>OPBD</Cd></CdOrPrtry></Tp><Amt Ccy="EUR">1000.00</Amt><CdtDbtInd>CRDT</CdtDbtInd><Dt><Dt>2024-03-04</Dt></Dt></Bal>
    <Bal><Tp><CdOrPrtry><Cd>CLBD</Cd></CdOrPrtry></Tp><Amt Ccy="EUR">1056.00</Amt><CdtDbtInd>CRDT</CdtDbtInd><Dt><Dt>2024-03-05</Dt></Dt></Bal>
    {entries}
  </Rpt></BkToCstmrAcctRpt>
</Document>"#
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = LedgerConfig::from_env()?;
    let ledger = PaymentLedger::with_config(MemoryStorage::new(), config);

    println!("Issuing invoices...");
    let sitsit = ledger
        .create_payment(invoice(
            PartyRef::new("u-aino", "Aino"),
            "Sitsit ticket",
            &["sitsit-aino"],
            2500,
        ))
        .await?;
    let sauna = ledger
        .create_payment(invoice(
            PartyRef::new("u-bertta", "Bertta"),
            "Sauna evening",
            &["sauna-bertta"],
            3000,
        ))
        .await?;
    for payment in [&sitsit, &sauna] {
        println!(
            "  #{} {:<16} {}",
            payment.payment_number,
            payment.title,
            payment.reference_number.as_deref().unwrap_or("-")
        );
    }

    let sitsit_reference = sitsit.reference_number.clone().unwrap_or_default();
    let sauna_reference = sauna.reference_number.clone().unwrap_or_default();
    let document = statement(&format!(
        "{}{}{}",
        entry("DEMO-TX-1", "25.00", &sitsit_reference),
        // Paid a euro short
        entry("DEMO-TX-2", "29.00", &sauna_reference),
        entry("DEMO-TX-3", "2.00", "00000098765"),
    ));

    let service = BankReconciliationService::new(ledger);
    let report = service.ingest(document.as_bytes()).await?;

    println!("\nImported statement {}:", report.statement.document_id);
    for item in &report.transactions {
        let outcome = match &item.outcome {
            Ok(Registration::Registered { event }) => format!("registered to {}", event.payment_id),
            Ok(Registration::AlreadyRegistered { .. }) => "already registered".to_string(),
            Ok(Registration::Unmatched) => "unmatched".to_string(),
            Err(error) => format!("failed: {error}"),
        };
        println!(
            "  {} {:>10} {}",
            item.transaction.id,
            item.transaction.signed_amount().to_string(),
            outcome
        );
    }
    println!("  {:?}", report.summary());

    let groups = service
        .ledger()
        .build_ledger_report(&ReportQuery {
            range: Default::default(),
            group_by: Some(GroupBy::Payer),
            as_of: Utc::now(),
        })
        .await?;

    println!("\nLedger by payer:");
    for group in groups {
        println!("  {} (total {})", group.group_label, group.total);
        for row in group.rows {
            println!(
                "    #{} {:<16} {:>12} {:?}",
                row.payment_number,
                row.title,
                row.balance.to_string(),
                row.status
            );
        }
    }

    println!("\nUnregistered transactions:");
    for transaction in service.unregistered_transactions().await? {
        println!(
            "  {} {} {}",
            transaction.id,
            transaction.signed_amount(),
            transaction.reference.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
