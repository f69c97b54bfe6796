//! End-to-end authority lifecycle: initialize a root CA, take in a CSR,
//! issue a host certificate, revoke it, and export a PKCS#12 bundle,
//! with every artifact passing through the depot.

use certforge::{
    create_intermediate, AuthorityBuilder, AuthorityOptions, CertificateRevocationList, Depot,
    ExtendedUsage, HostBuilder, IssuerPolicy, Key, KeyAlgorithm, PkiError, RequestBuilder,
    Subject,
};
use openssl::pkcs12::Pkcs12;
use time::{Duration, OffsetDateTime};

fn ca_subject() -> Subject {
    Subject {
        organization: "ACME Corp".into(),
        organizational_unit: "Security".into(),
        country: "US".into(),
        province: "CA".into(),
        locality: "San Francisco".into(),
        common_name: "ACME Root CA".into(),
    }
}

#[test]
fn full_lifecycle_through_the_depot() {
    let dir = tempfile::tempdir().unwrap();
    let depot = Depot::new(dir.path());

    // Initialize the authority: 18-month root plus an empty CRL.
    let ca_key = Key::generate(KeyAlgorithm::Ecdsa(certforge::EcdsaCurve::P256)).unwrap();
    let ca = AuthorityBuilder::new(ca_subject())
        .not_after(OffsetDateTime::now_utc() + Duration::days(548))
        .options(AuthorityOptions::default())
        .build(&ca_key)
        .unwrap();
    depot.put_certificate("ACME_Root_CA", &ca).unwrap();
    depot
        .put_encrypted_private_key("ACME_Root_CA", &ca_key, b"hunter2")
        .unwrap();
    let crl =
        CertificateRevocationList::create(&ca_key, &ca, OffsetDateTime::now_utc() + Duration::days(30))
            .unwrap();
    depot
        .put_certificate_revocation_list("ACME_Root_CA", &crl)
        .unwrap();

    // A host generates its key and request out of band.
    let host_key = Key::generate(KeyAlgorithm::Ed25519).unwrap();
    let csr = RequestBuilder::new(Subject::with_common_name("host1.acme.test"))
        .dns_domains(vec!["host1.acme.test".into()])
        .ip_addresses(vec!["192.0.2.10".into()])
        .build(&host_key)
        .unwrap();
    depot
        .put_certificate_signing_request("host1.acme.test", &csr)
        .unwrap();

    // The authority reloads its material from disk and signs. A two-year
    // certificate cannot outlive the 18-month root.
    let ca = depot.get_certificate("ACME_Root_CA").unwrap();
    let ca_key = depot
        .get_encrypted_private_key("ACME_Root_CA", b"hunter2")
        .unwrap();
    let csr = depot
        .get_certificate_signing_request("host1.acme.test")
        .unwrap();
    csr.check_signature().unwrap();

    let cert = HostBuilder::new(&ca, &ca_key, &csr)
        .not_after(OffsetDateTime::now_utc() + Duration::days(730))
        .build()
        .unwrap();
    depot.put_certificate("host1.acme.test", &cert).unwrap();
    assert!(cert.not_after().compare(ca.not_after()).unwrap().is_eq());
    assert!(cert.x509().verify(ca_key.pkey()).unwrap());

    // Revoke it. The replacement list carries exactly its serial.
    let crl = depot
        .get_certificate_revocation_list("ACME_Root_CA")
        .unwrap();
    let crl = crl
        .revoke(&ca_key, &ca, &cert.serial_bytes().unwrap())
        .unwrap();
    depot
        .replace_certificate_revocation_list("ACME_Root_CA", &crl)
        .unwrap();

    let reloaded = depot
        .get_certificate_revocation_list("ACME_Root_CA")
        .unwrap();
    let entries = reloaded.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].serial, cert.serial_bytes().unwrap());
    assert!(reloaded.issuer_bound_to(&ca).unwrap());

    // Bundle the host material for export.
    let pfx = certforge::export_pfx(&cert, &host_key, &[ca], "host1.acme.test", "exportpw").unwrap();
    depot
        .put_personal_information_exchange("host1.acme.test", &pfx)
        .unwrap();
    let stored = depot
        .get_personal_information_exchange("host1.acme.test")
        .unwrap();
    let parsed = Pkcs12::from_der(&stored).unwrap().parse2("exportpw").unwrap();
    assert!(parsed.pkey.is_some());
    assert!(parsed.cert.is_some());

    // The depot now lists every artifact of the exchange.
    let names: Vec<String> = depot.list().unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec![
            "ACME_Root_CA.crl",
            "ACME_Root_CA.crt",
            "ACME_Root_CA.key",
            "host1.acme.test.crt",
            "host1.acme.test.csr",
            "host1.acme.test.pfx",
        ]
    );
}

#[test]
fn three_tier_chain_with_name_constraints() {
    let root_key = Key::generate(KeyAlgorithm::Rsa(2048)).unwrap();
    let root = AuthorityBuilder::new(Subject::with_common_name("Root"))
        .not_after(OffsetDateTime::now_utc() + Duration::days(3650))
        .options(AuthorityOptions {
            path_length: Some(1),
            permitted_domains: vec!["acme.test".into()],
            ..Default::default()
        })
        .build(&root_key)
        .unwrap();

    let inter_key = Key::generate(KeyAlgorithm::Ecdsa(certforge::EcdsaCurve::P384)).unwrap();
    let inter_csr = RequestBuilder::new(Subject::with_common_name("Intermediate"))
        .build(&inter_key)
        .unwrap();
    let inter = create_intermediate(
        &root,
        &root_key,
        &inter_csr,
        OffsetDateTime::now_utc() + Duration::days(1825),
        IssuerPolicy::default(),
    )
    .unwrap();
    assert!(inter.is_ca().unwrap());
    assert!(inter.x509().verify(root_key.pkey()).unwrap());

    let host_key = Key::generate(KeyAlgorithm::Ed25519).unwrap();
    let host_csr = RequestBuilder::new(Subject::with_common_name("db.acme.test"))
        .dns_domains(vec!["db.acme.test".into()])
        .build(&host_key)
        .unwrap();
    let host = HostBuilder::new(&inter, &inter_key, &host_csr)
        .not_after(OffsetDateTime::now_utc() + Duration::days(365))
        .extended_key_usage(vec![ExtendedUsage::ServerAuth])
        .build()
        .unwrap();
    assert!(!host.is_ca().unwrap());
    assert!(host.x509().verify(inter_key.pkey()).unwrap());
}

#[test]
fn v1_self_signed_issuer_is_policy_gated() {
    use openssl::asn1::{Asn1Integer, Asn1Time};
    use openssl::bn::BigNum;
    use openssl::x509::X509Builder;

    // A version 1 self-signed certificate, no extensions at all.
    let legacy_key = Key::generate(KeyAlgorithm::Rsa(2048)).unwrap();
    let mut b = X509Builder::new().unwrap();
    let serial = BigNum::from_u32(1).unwrap();
    b.set_serial_number(Asn1Integer::from_bn(&serial).unwrap().as_ref())
        .unwrap();
    let name = {
        let mut n = openssl::x509::X509NameBuilder::new().unwrap();
        n.append_entry_by_nid(openssl::nid::Nid::COMMONNAME, "Legacy CA")
            .unwrap();
        n.build()
    };
    b.set_subject_name(&name).unwrap();
    b.set_issuer_name(&name).unwrap();
    b.set_not_before(Asn1Time::days_from_now(0).unwrap().as_ref())
        .unwrap();
    b.set_not_after(Asn1Time::days_from_now(365).unwrap().as_ref())
        .unwrap();
    b.set_pubkey(legacy_key.pkey()).unwrap();
    b.sign(legacy_key.pkey(), openssl::hash::MessageDigest::sha256())
        .unwrap();
    let legacy = certforge::Certificate::from_der(&b.build().to_der().unwrap()).unwrap();

    let host_key = Key::generate(KeyAlgorithm::Ed25519).unwrap();
    let csr = RequestBuilder::new(Subject::with_common_name("host"))
        .build(&host_key)
        .unwrap();

    // Accepted under the default legacy-compatible policy.
    HostBuilder::new(&legacy, &legacy_key, &csr)
        .not_after(OffsetDateTime::now_utc() + Duration::days(30))
        .build()
        .unwrap();

    // Refused under the strict policy.
    let err = HostBuilder::new(&legacy, &legacy_key, &csr)
        .not_after(OffsetDateTime::now_utc() + Duration::days(30))
        .policy(IssuerPolicy::strict())
        .build()
        .unwrap_err();
    assert!(matches!(err, PkiError::Policy(_)));
}
