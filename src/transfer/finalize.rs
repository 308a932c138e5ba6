use crate::transfer::errors::FinalizeError;
use crate::transfer::params::DecodeParams;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

pub type Result<T> = std::result::Result<T, FinalizeError>;

pub type UnitDecodeError = Box<dyn std::error::Error + Send + Sync>;

/// Turns one cached unit (coefficient region followed by data region) back into the original
/// payload slice for serial number `sn`.
pub trait UnitDecoder: Send {
    fn decode_unit(
        &mut self,
        params: &DecodeParams,
        sn: u64,
        unit: &[u8],
    ) -> std::result::Result<Vec<u8>, UnitDecodeError>;
}

/// Systematic code: the data region already is the payload, so the coefficients are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystematicDecoder;

impl UnitDecoder for SystematicDecoder {
    fn decode_unit(
        &mut self,
        params: &DecodeParams,
        _sn: u64,
        unit: &[u8],
    ) -> std::result::Result<Vec<u8>, UnitDecodeError> {
        let coeff = params.block_coeff_size as usize;
        let data = unit
            .get(coeff..)
            .ok_or_else(|| format!("unit of {} bytes has no data region", unit.len()))?;
        Ok(data.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    pub units: u64,
    pub bytes_written: u64,
    pub output: PathBuf,
}

/// Rebuilds the raw file from a fully populated cache file, unit by unit in serial order.
/// The output appears at `output` only once every byte has been written.
pub async fn finalize(
    params: &DecodeParams,
    cache_path: &Path,
    output: &Path,
    decoder: &mut dyn UnitDecoder,
) -> Result<FinalizeReport> {
    let cache = tokio::fs::File::open(cache_path)
        .await
        .map_err(|source| FinalizeError::OpenCache {
            path: cache_path.to_path_buf(),
            source,
        })?;
    let mut reader = BufReader::new(cache);

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| FinalizeError::CreateOutput {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let tmp = tmp_path(output);
    let out = tokio::fs::File::create(&tmp)
        .await
        .map_err(|source| FinalizeError::CreateOutput {
            path: tmp.clone(),
            source,
        })?;
    let mut writer = BufWriter::new(out);

    let result = write_units(params, &mut reader, &mut writer, &tmp, decoder).await;
    let written = match result {
        Ok(written) => written,
        Err(err) => {
            drop(writer);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }
    };
    drop(writer);

    tokio::fs::rename(&tmp, output)
        .await
        .map_err(|source| FinalizeError::WriteOutput {
            path: output.to_path_buf(),
            source,
        })?;

    tracing::info!(
        units = params.total_blocks,
        bytes = written,
        output = %output.display(),
        "raw file reconstructed"
    );
    Ok(FinalizeReport {
        units: params.total_blocks,
        bytes_written: written,
        output: output.to_path_buf(),
    })
}

async fn write_units<R, W>(
    params: &DecodeParams,
    reader: &mut R,
    writer: &mut W,
    out_path: &Path,
    decoder: &mut dyn UnitDecoder,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let unit_size = params.unit_size();
    let raw_len = params.raw_file_length;
    let mut unit = vec![0u8; unit_size];
    let mut written: u64 = 0;

    for sn in 0..params.total_blocks {
        let got = read_full(reader, &mut unit)
            .await
            .map_err(|source| FinalizeError::ReadCache { sn, source })?;
        if got != unit_size {
            return Err(FinalizeError::ShortRead {
                sn,
                expected: unit_size,
                actual: got,
            });
        }

        let mut payload = decoder
            .decode_unit(params, sn, &unit)
            .map_err(|e| FinalizeError::Decode {
                sn,
                reason: e.to_string(),
            })?;
        let remaining = raw_len.saturating_sub(written);
        if payload.len() as u64 > remaining {
            payload.truncate(remaining as usize);
        }
        if payload.is_empty() {
            continue;
        }
        writer
            .write_all(&payload)
            .await
            .map_err(|source| FinalizeError::WriteOutput {
                path: out_path.to_path_buf(),
                source,
            })?;
        written += payload.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|source| FinalizeError::WriteOutput {
            path: out_path.to_path_buf(),
            source,
        })?;

    if written != raw_len {
        return Err(FinalizeError::LengthMismatch {
            expected: raw_len,
            written,
        });
    }
    Ok(written)
}

async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::params::sample_params;

    fn temp_dir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("blockcast-finalize-{tag}-{nanos}"));
        p
    }

    // Coefficient bytes are 0xCC; data bytes of unit `sn` are `sn`.
    fn cache_bytes(params: &DecodeParams, units: u64) -> Vec<u8> {
        let mut out = Vec::new();
        for sn in 0..units {
            out.extend(std::iter::repeat_n(0xCC, params.block_coeff_size as usize));
            out.extend(std::iter::repeat_n(sn as u8, params.block_data_size as usize));
        }
        out
    }

    #[tokio::test]
    async fn writes_exactly_raw_length_and_strips_coefficients() {
        let root = temp_dir("exact");
        tokio::fs::create_dir_all(&root).await.expect("mkdir");
        let p = sample_params();
        let cache = root.join("rcv.cache");
        tokio::fs::write(&cache, cache_bytes(&p, 10)).await.expect("cache");

        let out = root.join("out.raw");
        let report = finalize(&p, &cache, &out, &mut SystematicDecoder)
            .await
            .expect("finalize");
        assert_eq!(report.bytes_written, 2500);
        assert_eq!(report.units, 10);

        let raw = tokio::fs::read(&out).await.expect("read");
        assert_eq!(raw.len(), 2500);
        assert!(!raw.contains(&0xCC));
        assert!(raw[9 * 250..].iter().all(|b| *b == 9));
        assert!(!tmp_path(&out).exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn last_unit_is_truncated_to_declared_length() {
        let root = temp_dir("truncate");
        tokio::fs::create_dir_all(&root).await.expect("mkdir");
        let p = DecodeParams {
            raw_file_length: 2380,
            ..sample_params()
        };
        let cache = root.join("rcv.cache");
        tokio::fs::write(&cache, cache_bytes(&p, 10)).await.expect("cache");

        let out = root.join("out.raw");
        let report = finalize(&p, &cache, &out, &mut SystematicDecoder)
            .await
            .expect("finalize");
        assert_eq!(report.bytes_written, 2380);
        let raw = tokio::fs::read(&out).await.expect("read");
        assert_eq!(raw.len(), 2380);
        assert_eq!(raw[2379], 9);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn short_cache_is_a_finalize_failure() {
        let root = temp_dir("short");
        tokio::fs::create_dir_all(&root).await.expect("mkdir");
        let p = sample_params();
        let cache = root.join("rcv.cache");
        let mut bytes = cache_bytes(&p, 10);
        bytes.truncate(bytes.len() - 1);
        tokio::fs::write(&cache, bytes).await.expect("cache");

        let out = root.join("out.raw");
        let err = finalize(&p, &cache, &out, &mut SystematicDecoder)
            .await
            .expect_err("short read");
        assert!(matches!(
            err,
            FinalizeError::ShortRead {
                sn: 9,
                expected: 260,
                actual: 259
            }
        ));
        assert!(!out.exists());
        assert!(!tmp_path(&out).exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn too_little_payload_is_a_length_mismatch() {
        let root = temp_dir("mismatch");
        tokio::fs::create_dir_all(&root).await.expect("mkdir");
        let p = sample_params();
        let cache = root.join("rcv.cache");
        tokio::fs::write(&cache, cache_bytes(&p, 10)).await.expect("cache");

        struct HalfDecoder;
        impl UnitDecoder for HalfDecoder {
            fn decode_unit(
                &mut self,
                params: &DecodeParams,
                _sn: u64,
                unit: &[u8],
            ) -> std::result::Result<Vec<u8>, UnitDecodeError> {
                let coeff = params.block_coeff_size as usize;
                Ok(unit[coeff..coeff + 100].to_vec())
            }
        }

        let out = root.join("out.raw");
        let err = finalize(&p, &cache, &out, &mut HalfDecoder)
            .await
            .expect_err("mismatch");
        assert!(matches!(
            err,
            FinalizeError::LengthMismatch {
                expected: 2500,
                written: 1000
            }
        ));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_cache_reports_open_failure() {
        let root = temp_dir("missing");
        let p = sample_params();
        let err = finalize(&p, &root.join("nope"), &root.join("out"), &mut SystematicDecoder)
            .await
            .expect_err("missing");
        assert!(matches!(err, FinalizeError::OpenCache { .. }));
    }
}
